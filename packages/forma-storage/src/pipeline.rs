use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{
	Error, Result,
	query::{Filter, SortSpec},
	value::{self, compare_values, number_value, values_equal},
};

/// Runs an aggregation pipeline over a loaded collection.
pub fn run_pipeline(mut docs: Vec<Value>, pipeline: &[Value]) -> Result<Vec<Value>> {
	for stage in pipeline {
		let Some((name, spec)) = single_entry(stage) else {
			return Err(Error::InvalidQuery(
				"Each pipeline stage must be an object with exactly one key.".to_string(),
			));
		};

		docs = match name {
			"$match" => {
				let filter = Filter::parse(spec)?;

				docs.into_iter().filter(|doc| filter.matches(doc)).collect()
			},
			"$project" => project(docs, spec)?,
			"$group" => group(docs, spec)?,
			"$sort" => {
				SortSpec::parse(spec)?.sort(&mut docs);

				docs
			},
			"$limit" => {
				let limit = count_operand(name, spec)?;

				docs.into_iter().take(limit).collect()
			},
			"$skip" => {
				let skip = count_operand(name, spec)?;

				docs.into_iter().skip(skip).collect()
			},
			"$unwind" => unwind(docs, spec)?,
			"$count" => {
				let Some(field) = spec.as_str().filter(|field| !field.is_empty()) else {
					return Err(Error::InvalidQuery("$count expects a field name.".to_string()));
				};

				if docs.is_empty() {
					Vec::new()
				} else {
					let mut out = Map::new();

					out.insert(field.to_string(), Value::from(docs.len() as u64));

					vec![Value::Object(out)]
				}
			},
			other => return Err(Error::InvalidQuery(format!("Unsupported pipeline stage {other}."))),
		};
	}

	Ok(docs)
}

/// Evaluates an aggregation expression against one document.
pub fn eval_expr(doc: &Value, expr: &Value) -> Result<Value> {
	match expr {
		Value::String(text) => match text.strip_prefix('$') {
			Some(path) => Ok(value::lookup_path(doc, path).cloned().unwrap_or(Value::Null)),
			None => Ok(expr.clone()),
		},
		Value::Array(items) =>
			items.iter().map(|item| eval_expr(doc, item)).collect::<Result<Vec<_>>>().map(Value::Array),
		Value::Object(obj) => {
			if value::as_date(expr).is_some() {
				return Ok(expr.clone());
			}
			if let Some((op, operand)) = single_entry(expr)
				&& op.starts_with('$')
			{
				return eval_operator(doc, op, operand);
			}

			let mut out = Map::new();

			for (key, item) in obj {
				out.insert(key.clone(), eval_expr(doc, item)?);
			}

			Ok(Value::Object(out))
		},
		_ => Ok(expr.clone()),
	}
}

fn eval_operator(doc: &Value, op: &str, operand: &Value) -> Result<Value> {
	if op == "$literal" {
		return Ok(operand.clone());
	}

	let args = match operand {
		Value::Array(items) => items.iter().map(|item| eval_expr(doc, item)).collect::<Result<Vec<_>>>()?,
		other => vec![eval_expr(doc, other)?],
	};

	match op {
		"$concat" => {
			let mut out = String::new();

			for arg in &args {
				match arg {
					Value::String(text) => out.push_str(text),
					Value::Null => return Ok(Value::Null),
					_ => return Err(Error::InvalidQuery("$concat only supports strings.".to_string())),
				}
			}

			Ok(Value::String(out))
		},
		"$add" => fold_numbers(op, &args, 0.0, |acc, n| acc + n),
		"$multiply" => fold_numbers(op, &args, 1.0, |acc, n| acc * n),
		"$subtract" | "$divide" => {
			let [left, right] = args.as_slice() else {
				return Err(Error::InvalidQuery(format!("{op} expects two arguments.")));
			};
			let (Some(left), Some(right)) = (left.as_f64(), right.as_f64()) else {
				return Ok(Value::Null);
			};

			if op == "$subtract" {
				Ok(number_value(left - right))
			} else if right == 0.0 {
				Err(Error::InvalidQuery("$divide by zero.".to_string()))
			} else {
				Ok(number_value(left / right))
			}
		},
		"$toUpper" | "$toLower" => {
			let text = args.first().map(value::display_string).unwrap_or_default();

			Ok(Value::String(if op == "$toUpper" { text.to_uppercase() } else { text.to_lowercase() }))
		},
		"$ifNull" => Ok(args.iter().find(|arg| !arg.is_null()).cloned().unwrap_or(Value::Null)),
		other => Err(Error::InvalidQuery(format!("Unsupported expression operator {other}."))),
	}
}

fn fold_numbers(op: &str, args: &[Value], init: f64, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
	let mut acc = init;

	for arg in args {
		match arg {
			Value::Number(n) => acc = f(acc, n.as_f64().unwrap_or(0.0)),
			Value::Null => return Ok(Value::Null),
			_ => return Err(Error::InvalidQuery(format!("{op} only supports numbers."))),
		}
	}

	Ok(number_value(acc))
}

fn project(docs: Vec<Value>, spec: &Value) -> Result<Vec<Value>> {
	let Some(fields) = spec.as_object() else {
		return Err(Error::InvalidQuery("$project expects an object.".to_string()));
	};
	let is_flag = |item: &Value| matches!(item, Value::Bool(_) | Value::Number(_));
	let excludes_only = fields
		.iter()
		.filter(|(key, _)| key.as_str() != "_id")
		.all(|(_, item)| is_flag(item) && !flag_on(item))
		&& fields.keys().any(|key| key != "_id");

	if excludes_only {
		return Ok(docs
			.into_iter()
			.map(|mut doc| {
				for (key, item) in fields {
					if !flag_on(item) {
						value::remove_path(&mut doc, key);
					}
				}

				doc
			})
			.collect());
	}

	docs.into_iter()
		.map(|doc| {
			let mut out = Value::Object(Map::new());

			if !fields.contains_key("_id")
				&& let Some(id) = doc.get("_id")
			{
				value::set_path(&mut out, "_id", id.clone());
			}

			for (key, item) in fields {
				if is_flag(item) {
					if !flag_on(item) {
						if key != "_id" {
							return Err(Error::InvalidQuery(
								"$project cannot mix inclusion and exclusion.".to_string(),
							));
						}

						continue;
					}
					if let Some(found) = value::lookup_path(&doc, key) {
						value::set_path(&mut out, key, found.clone());
					}
				} else {
					value::set_path(&mut out, key, eval_expr(&doc, item)?);
				}
			}

			Ok(out)
		})
		.collect()
}

fn flag_on(item: &Value) -> bool {
	match item {
		Value::Bool(flag) => *flag,
		Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
		_ => true,
	}
}

enum Accumulator {
	Sum { total: f64 },
	Avg { total: f64, count: u64 },
	Min(Option<Value>),
	Max(Option<Value>),
	First(Option<Value>),
	Last(Option<Value>),
	Push(Vec<Value>),
	AddToSet(Vec<Value>),
}
impl Accumulator {
	fn new(op: &str) -> Result<Self> {
		Ok(match op {
			"$sum" => Self::Sum { total: 0.0 },
			"$avg" => Self::Avg { total: 0.0, count: 0 },
			"$min" => Self::Min(None),
			"$max" => Self::Max(None),
			"$first" => Self::First(None),
			"$last" => Self::Last(None),
			"$push" => Self::Push(Vec::new()),
			"$addToSet" => Self::AddToSet(Vec::new()),
			other => return Err(Error::InvalidQuery(format!("Unsupported accumulator {other}."))),
		})
	}

	fn add(&mut self, item: Value) {
		match self {
			Self::Sum { total } =>
				if let Some(n) = item.as_f64() {
					*total += n;
				},
			Self::Avg { total, count } =>
				if let Some(n) = item.as_f64() {
					*total += n;
					*count += 1;
				},
			Self::Min(current) =>
				if !item.is_null()
					&& current.as_ref().is_none_or(|cur| compare_values(&item, cur).is_lt())
				{
					*current = Some(item);
				},
			Self::Max(current) =>
				if !item.is_null()
					&& current.as_ref().is_none_or(|cur| compare_values(&item, cur).is_gt())
				{
					*current = Some(item);
				},
			Self::First(current) =>
				if current.is_none() {
					*current = Some(item);
				},
			Self::Last(current) => *current = Some(item),
			Self::Push(items) =>
				if !item.is_null() {
					items.push(item);
				},
			Self::AddToSet(items) =>
				if !item.is_null() && !items.iter().any(|existing| values_equal(existing, &item)) {
					items.push(item);
				},
		}
	}

	fn finish(self) -> Value {
		match self {
			Self::Sum { total } => number_value(total),
			Self::Avg { total, count } =>
				if count == 0 { Value::Null } else { number_value(total / count as f64) },
			Self::Min(item) | Self::Max(item) | Self::First(item) | Self::Last(item) =>
				item.unwrap_or(Value::Null),
			Self::Push(items) | Self::AddToSet(items) => Value::Array(items),
		}
	}
}

fn group(docs: Vec<Value>, spec: &Value) -> Result<Vec<Value>> {
	let Some(fields) = spec.as_object() else {
		return Err(Error::InvalidQuery("$group expects an object.".to_string()));
	};
	let Some(id_expr) = fields.get("_id") else {
		return Err(Error::InvalidQuery("$group requires an _id expression.".to_string()));
	};
	let mut accumulators: Vec<(&str, &str, &Value)> = Vec::new();

	for (name, item) in fields {
		if name == "_id" {
			continue;
		}

		let Some((op, operand)) = single_entry(item) else {
			return Err(Error::InvalidQuery(format!("Accumulator {name} must have exactly one operator.")));
		};

		Accumulator::new(op)?;
		accumulators.push((name.as_str(), op, operand));
	}

	let mut order: Vec<(Value, Vec<Accumulator>)> = Vec::new();
	let mut index: HashMap<String, usize> = HashMap::new();

	for doc in &docs {
		let key = eval_expr(doc, id_expr)?;
		let slot = match index.get(&key.to_string()) {
			Some(slot) => *slot,
			None => {
				let accs =
					accumulators.iter().map(|(_, op, _)| Accumulator::new(op)).collect::<Result<Vec<_>>>()?;

				index.insert(key.to_string(), order.len());
				order.push((key, accs));

				order.len() - 1
			},
		};

		for (acc, (_, _, operand)) in order[slot].1.iter_mut().zip(accumulators.iter()) {
			acc.add(eval_expr(doc, operand)?);
		}
	}

	Ok(order
		.into_iter()
		.map(|(key, accs)| {
			let mut out = Map::new();

			out.insert("_id".to_string(), key);

			for (acc, (name, _, _)) in accs.into_iter().zip(accumulators.iter()) {
				out.insert((*name).to_string(), acc.finish());
			}

			Value::Object(out)
		})
		.collect())
}

fn unwind(docs: Vec<Value>, spec: &Value) -> Result<Vec<Value>> {
	let (path, preserve) = match spec {
		Value::String(path) => (path.as_str(), false),
		Value::Object(obj) => (
			obj.get("path").and_then(Value::as_str).unwrap_or_default(),
			obj.get("preserveNullAndEmptyArrays").and_then(Value::as_bool).unwrap_or(false),
		),
		_ => ("", false),
	};
	let Some(path) = path.strip_prefix('$').filter(|path| !path.is_empty()) else {
		return Err(Error::InvalidQuery("$unwind expects a $-prefixed field path.".to_string()));
	};
	let mut out = Vec::with_capacity(docs.len());

	for doc in docs {
		match value::lookup_path(&doc, path).cloned() {
			Some(Value::Array(items)) if !items.is_empty() =>
				for item in items {
					let mut copy = doc.clone();

					value::set_path(&mut copy, path, item);
					out.push(copy);
				},
			Some(Value::Array(_)) | Some(Value::Null) | None =>
				if preserve {
					out.push(doc);
				},
			Some(_) => out.push(doc),
		}
	}

	Ok(out)
}

fn count_operand(stage: &str, spec: &Value) -> Result<usize> {
	spec.as_u64()
		.map(|n| n as usize)
		.ok_or_else(|| Error::InvalidQuery(format!("{stage} expects a non-negative integer.")))
}

fn single_entry(value: &Value) -> Option<(&str, &Value)> {
	let obj = value.as_object()?;

	if obj.len() != 1 {
		return None;
	}

	obj.iter().next().map(|(key, item)| (key.as_str(), item))
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn sales() -> Vec<Value> {
		vec![
			json!({ "_id": "a", "make": "Ford", "price": 100, "sold": { "$date": "2020-03-01T00:00:00.000Z" } }),
			json!({ "_id": "b", "make": "Audi", "price": 250, "sold": { "$date": "2019-05-01T00:00:00.000Z" } }),
			json!({ "_id": "c", "make": "Ford", "price": 50, "sold": { "$date": "2021-01-01T00:00:00.000Z" } }),
		]
	}

	#[test]
	fn group_sums_and_sorts() {
		let pipeline = vec![
			json!({ "$group": { "_id": "$make", "total": { "$sum": "$price" }, "count": { "$sum": 1 } } }),
			json!({ "$sort": { "total": -1 } }),
		];
		let rows = run_pipeline(sales(), &pipeline).expect("Pipeline must run.");

		assert_eq!(
			rows,
			vec![
				json!({ "_id": "Audi", "total": 250, "count": 1 }),
				json!({ "_id": "Ford", "total": 150, "count": 2 }),
			]
		);
	}

	#[test]
	fn match_compares_dates_chronologically() {
		let pipeline = vec![
			json!({ "$match": { "sold": { "$gte": { "$date": "2020-01-01T00:00:00.000Z" } } } }),
			json!({ "$project": { "make": 1 } }),
		];
		let rows = run_pipeline(sales(), &pipeline).expect("Pipeline must run.");

		assert_eq!(rows, vec![json!({ "_id": "a", "make": "Ford" }), json!({ "_id": "c", "make": "Ford" })]);
	}

	#[test]
	fn project_evaluates_expressions_and_drops_id_on_request() {
		let pipeline =
			vec![json!({ "$project": { "_id": 0, "label": { "$concat": ["$make", "-", "$_id"] } } })];
		let rows = run_pipeline(sales(), &pipeline).expect("Pipeline must run.");

		assert_eq!(rows[0], json!({ "label": "Ford-a" }));
	}

	#[test]
	fn unwind_then_count() {
		let docs = vec![json!({ "_id": 1, "tags": ["x", "y"] }), json!({ "_id": 2, "tags": [] })];
		let pipeline = vec![json!({ "$unwind": "$tags" }), json!({ "$count": "n" })];
		let rows = run_pipeline(docs, &pipeline).expect("Pipeline must run.");

		assert_eq!(rows, vec![json!({ "n": 2 })]);
	}

	#[test]
	fn unsupported_stage_is_rejected() {
		let err = run_pipeline(sales(), &[json!({ "$lookup": {} })]).expect_err("Stage must fail.");

		assert!(matches!(err, Error::InvalidQuery(message) if message.contains("$lookup")));
	}
}
