//! Helpers for JSON documents: dotted-path access, date values and a total ordering that is
//! shared by filters, sorts and aggregation accumulators.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339, macros::format_description};

/// Dates travel as `{"$date": "YYYY-MM-DDTHH:MM:SS.mmmZ"}`.
pub const DATE_KEY: &str = "$date";

pub fn date_value(ts: OffsetDateTime) -> Value {
	let ts = ts.to_offset(UtcOffset::UTC);
	let text = ts
		.format(format_description!(
			"[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
		))
		.unwrap_or_else(|_| ts.unix_timestamp().to_string());
	let mut obj = Map::new();

	obj.insert(DATE_KEY.to_string(), Value::String(text));

	Value::Object(obj)
}

pub fn as_date(value: &Value) -> Option<OffsetDateTime> {
	let obj = value.as_object()?;

	if obj.len() != 1 {
		return None;
	}

	let text = obj.get(DATE_KEY)?.as_str()?;

	OffsetDateTime::parse(text, &Rfc3339).ok()
}

/// Follows a dotted path through nested objects. Arrays are not traversed.
pub fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
	let mut current = doc;

	for segment in path.split('.') {
		current = current.as_object()?.get(segment)?;
	}

	Some(current)
}

/// Collects every value reachable through `path`, fanning out across arrays of sub-documents
/// the way document filters do.
pub fn collect_path<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
	let segments: Vec<&str> = path.split('.').collect();
	let mut out = Vec::new();

	collect_segments(doc, &segments, &mut out);

	out
}

fn collect_segments<'a>(current: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
	let Some((head, rest)) = segments.split_first() else {
		out.push(current);

		return;
	};

	match current {
		Value::Object(obj) =>
			if let Some(next) = obj.get(*head) {
				collect_segments(next, rest, out);
			},
		Value::Array(items) =>
			for item in items {
				if item.is_object() {
					collect_segments(item, segments, out);
				}
			},
		_ => {},
	}
}

/// Writes `value` at a dotted path, creating intermediate objects as needed.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
	let mut current = doc;
	let mut segments = path.split('.').peekable();

	while let Some(segment) = segments.next() {
		if !current.is_object() {
			*current = Value::Object(Map::new());
		}

		let Some(obj) = current.as_object_mut() else {
			return;
		};

		if segments.peek().is_none() {
			obj.insert(segment.to_string(), value);

			return;
		}

		current = obj.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
	}
}

/// Removes a dotted path. Arrays of sub-documents on the way have the path removed from every
/// element.
pub fn remove_path(doc: &mut Value, path: &str) {
	let segments: Vec<&str> = path.split('.').collect();

	remove_segments(doc, &segments);
}

fn remove_segments(current: &mut Value, segments: &[&str]) {
	let Some((head, rest)) = segments.split_first() else {
		return;
	};

	match current {
		Value::Object(obj) =>
			if rest.is_empty() {
				obj.retain(|key, _| key.as_str() != *head);
			} else if let Some(next) = obj.get_mut(*head) {
				remove_segments(next, rest);
			},
		Value::Array(items) =>
			for item in items {
				remove_segments(item, segments);
			},
		_ => {},
	}
}

/// String form used for ids, display strings and translation lookups.
pub fn display_string(value: &Value) -> String {
	if let Some(obj) = value.as_object()
		&& obj.len() == 1
		&& let Some(Value::String(text)) = obj.get(DATE_KEY)
	{
		return text.clone();
	}

	match value {
		Value::Null => String::new(),
		Value::String(text) => text.clone(),
		Value::Bool(flag) => flag.to_string(),
		Value::Number(number) => number.to_string(),
		Value::Array(items) => items.iter().map(display_string).collect::<Vec<_>>().join(","),
		Value::Object(_) => value.to_string(),
	}
}

pub fn id_string(value: &Value) -> String {
	display_string(value)
}

pub fn id_matches(doc: &Value, id: &str) -> bool {
	doc.get("_id").map(|value| id_string(value) == id).unwrap_or(false)
}

pub fn number_value(number: f64) -> Value {
	if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
		return Value::from(number as i64);
	}

	Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}

/// Canonical type order used when values of different kinds meet in a sort.
pub fn type_rank(value: &Value) -> u8 {
	if as_date(value).is_some() {
		return 6;
	}

	match value {
		Value::Null => 0,
		Value::Number(_) => 1,
		Value::String(_) => 2,
		Value::Object(_) => 3,
		Value::Array(_) => 4,
		Value::Bool(_) => 5,
	}
}

pub fn compare_values(a: &Value, b: &Value) -> Ordering {
	let (rank_a, rank_b) = (type_rank(a), type_rank(b));

	if rank_a != rank_b {
		return rank_a.cmp(&rank_b);
	}

	match (a, b) {
		(Value::Number(x), Value::Number(y)) => {
			let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));

			x.partial_cmp(&y).unwrap_or(Ordering::Equal)
		},
		(Value::String(x), Value::String(y)) => x.cmp(y),
		(Value::Bool(x), Value::Bool(y)) => x.cmp(y),
		(Value::Array(x), Value::Array(y)) => {
			for (left, right) in x.iter().zip(y.iter()) {
				let ord = compare_values(left, right);

				if ord != Ordering::Equal {
					return ord;
				}
			}

			x.len().cmp(&y.len())
		},
		_ => match (as_date(a), as_date(b)) {
			(Some(x), Some(y)) => x.cmp(&y),
			_ => a.to_string().cmp(&b.to_string()),
		},
	}
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
		(Value::Array(x), Value::Array(y)) =>
			x.len() == y.len() && x.iter().zip(y.iter()).all(|(left, right)| values_equal(left, right)),
		(Value::Object(x), Value::Object(y)) => match (as_date(a), as_date(b)) {
			(Some(left), Some(right)) => left == right,
			_ =>
				x.len() == y.len()
					&& x.iter().all(|(key, left)| y.get(key).is_some_and(|right| values_equal(left, right))),
		},
		_ => a == b,
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;
	use time::macros::datetime;

	use super::*;

	#[test]
	fn date_values_round_trip_through_their_text_form() {
		let value = date_value(datetime!(2020-01-01 00:00:00 UTC));

		assert_eq!(value, json!({ "$date": "2020-01-01T00:00:00.000Z" }));
		assert_eq!(as_date(&value), Some(datetime!(2020-01-01 00:00:00 UTC)));
	}

	#[test]
	fn collect_path_fans_out_over_sub_document_arrays() {
		let doc = json!({ "owners": [{ "name": "Jo" }, { "name": "Al" }, 3] });
		let names: Vec<&Value> = collect_path(&doc, "owners.name");

		assert_eq!(names, vec![&json!("Jo"), &json!("Al")]);
	}

	#[test]
	fn remove_path_strips_nested_fields_inside_arrays() {
		let mut doc = json!({ "a": 1, "subs": [{ "pin": 1, "x": 2 }, { "pin": 3 }] });

		remove_path(&mut doc, "subs.pin");

		assert_eq!(doc, json!({ "a": 1, "subs": [{ "x": 2 }, {}] }));
	}

	#[test]
	fn numbers_order_before_strings_and_dates_order_chronologically() {
		assert_eq!(compare_values(&json!(5), &json!("a")), Ordering::Less);
		assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
		assert_eq!(
			compare_values(
				&json!({ "$date": "2021-01-01T00:00:00.000Z" }),
				&json!({ "$date": "2020-06-01T00:00:00.000Z" })
			),
			Ordering::Greater
		);
	}

	#[test]
	fn integral_and_float_numbers_compare_equal() {
		assert!(values_equal(&json!(1), &json!(1.0)));
		assert!(!values_equal(&json!("1"), &json!(1)));
	}
}
