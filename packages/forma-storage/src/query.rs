use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::{
	Error, Result,
	value::{self, collect_path, compare_values, values_equal},
};

#[derive(Debug, Clone, Default)]
pub struct FindQuery {
	/// Filter document. `Null` and `{}` both match everything.
	pub filter: Value,
	/// Restricts matches to these `_id` values.
	pub id_in: Option<Vec<Value>>,
	pub projection: Projection,
	pub sort: Option<SortSpec>,
	pub limit: Option<usize>,
	pub skip: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
	#[default]
	All,
	Exclude(Vec<String>),
}
impl Projection {
	pub fn exclude<I, S>(fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let fields: Vec<String> = fields.into_iter().map(Into::into).collect();

		if fields.is_empty() { Self::All } else { Self::Exclude(fields) }
	}

	pub fn apply(&self, doc: &mut Value) {
		if let Self::Exclude(fields) = self {
			for field in fields {
				value::remove_path(doc, field);
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
	pub field: String,
	pub descending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec(pub Vec<SortKey>);
impl SortSpec {
	/// Accepts `{"field": 1, "other": -1}` objects or `"field -other"` strings.
	pub fn parse(raw: &Value) -> Result<Self> {
		let mut keys = Vec::new();

		match raw {
			Value::Object(obj) =>
				for (field, direction) in obj {
					let descending = match direction {
						Value::Number(n) if n.as_f64() == Some(1.0) => false,
						Value::Number(n) if n.as_f64() == Some(-1.0) => true,
						Value::String(s) if matches!(s.as_str(), "asc" | "ascending") => false,
						Value::String(s) if matches!(s.as_str(), "desc" | "descending") => true,
						_ =>
							return Err(Error::InvalidQuery(format!(
								"Sort direction for {field} must be 1 or -1."
							))),
					};

					keys.push(SortKey { field: field.clone(), descending });
				},
			Value::String(text) =>
				for token in text.split_whitespace() {
					match token.strip_prefix('-') {
						Some(field) => keys.push(SortKey { field: field.to_string(), descending: true }),
						None => keys.push(SortKey { field: token.to_string(), descending: false }),
					}
				},
			_ => return Err(Error::InvalidQuery("Sort must be an object or a string.".to_string())),
		}

		Ok(Self(keys))
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
		for key in &self.0 {
			let left = value::lookup_path(a, &key.field).unwrap_or(&Value::Null);
			let right = value::lookup_path(b, &key.field).unwrap_or(&Value::Null);
			let ord = compare_values(left, right);
			let ord = if key.descending { ord.reverse() } else { ord };

			if ord != Ordering::Equal {
				return ord;
			}
		}

		Ordering::Equal
	}

	pub fn sort(&self, docs: &mut [Value]) {
		docs.sort_by(|a, b| self.compare(a, b));
	}
}

/// Compiled form of a filter document.
#[derive(Debug, Clone)]
pub enum Filter {
	All,
	And(Vec<Filter>),
	Or(Vec<Filter>),
	Nor(Vec<Filter>),
	Field { path: String, ops: Vec<FieldOp> },
}

#[derive(Debug, Clone)]
pub enum FieldOp {
	Eq(Value),
	Ne(Value),
	Gt(Value),
	Gte(Value),
	Lt(Value),
	Lte(Value),
	In(Vec<Value>),
	Nin(Vec<Value>),
	Exists(bool),
	Regex(Regex),
	Not(Vec<FieldOp>),
}

impl Filter {
	pub fn parse(raw: &Value) -> Result<Self> {
		let obj = match raw {
			Value::Null => return Ok(Self::All),
			Value::Object(obj) => obj,
			_ => return Err(Error::InvalidQuery("Filter must be an object.".to_string())),
		};
		let mut clauses = Vec::new();

		for (key, condition) in obj {
			match key.as_str() {
				"$and" => clauses.push(Self::And(parse_filter_list(key, condition)?)),
				"$or" => clauses.push(Self::Or(parse_filter_list(key, condition)?)),
				"$nor" => clauses.push(Self::Nor(parse_filter_list(key, condition)?)),
				other if other.starts_with('$') =>
					return Err(Error::InvalidQuery(format!("Unsupported filter operator {other}."))),
				path => clauses.push(Self::Field { path: path.to_string(), ops: parse_condition(condition)? }),
			}
		}

		Ok(match clauses.len() {
			0 => Self::All,
			1 => clauses.remove(0),
			_ => Self::And(clauses),
		})
	}

	pub fn matches(&self, doc: &Value) -> bool {
		match self {
			Self::All => true,
			Self::And(filters) => filters.iter().all(|filter| filter.matches(doc)),
			Self::Or(filters) => filters.iter().any(|filter| filter.matches(doc)),
			Self::Nor(filters) => !filters.iter().any(|filter| filter.matches(doc)),
			Self::Field { path, ops } => {
				let candidates = collect_path(doc, path);

				ops.iter().all(|op| op.matches(&candidates))
			},
		}
	}
}

impl FieldOp {
	fn matches(&self, candidates: &[&Value]) -> bool {
		match self {
			Self::Eq(expected) => eq_any(candidates, expected),
			Self::Ne(expected) => !eq_any(candidates, expected),
			Self::Gt(bound) => cmp_any(candidates, bound, |ord| ord == Ordering::Greater),
			Self::Gte(bound) => cmp_any(candidates, bound, |ord| ord != Ordering::Less),
			Self::Lt(bound) => cmp_any(candidates, bound, |ord| ord == Ordering::Less),
			Self::Lte(bound) => cmp_any(candidates, bound, |ord| ord != Ordering::Greater),
			Self::In(options) => options.iter().any(|expected| eq_any(candidates, expected)),
			Self::Nin(options) => !options.iter().any(|expected| eq_any(candidates, expected)),
			Self::Exists(expected) => !candidates.is_empty() == *expected,
			Self::Regex(re) => flatten(candidates)
				.into_iter()
				.any(|candidate| candidate.as_str().is_some_and(|text| re.is_match(text))),
			Self::Not(ops) => !ops.iter().all(|op| op.matches(candidates)),
		}
	}
}

/// Evaluates `query` against an in-memory collection: filter, id restriction, sort, skip,
/// limit, then projection.
pub fn apply_find<I>(docs: I, query: &FindQuery) -> Result<Vec<Value>>
where
	I: IntoIterator<Item = Value>,
{
	let filter = Filter::parse(&query.filter)?;
	let mut matched: Vec<Value> = docs
		.into_iter()
		.filter(|doc| filter.matches(doc))
		.filter(|doc| match &query.id_in {
			Some(ids) => doc.get("_id").is_some_and(|id| ids.iter().any(|want| values_equal(id, want))),
			None => true,
		})
		.collect();

	if let Some(sort) = query.sort.as_ref() {
		sort.sort(&mut matched);
	}

	let skip = query.skip.unwrap_or(0);
	let limit = query.limit.unwrap_or(usize::MAX);

	Ok(matched
		.into_iter()
		.skip(skip)
		.take(limit)
		.map(|mut doc| {
			query.projection.apply(&mut doc);

			doc
		})
		.collect())
}

fn parse_filter_list(key: &str, raw: &Value) -> Result<Vec<Filter>> {
	let Some(items) = raw.as_array() else {
		return Err(Error::InvalidQuery(format!("{key} expects an array of filters.")));
	};

	items.iter().map(Filter::parse).collect()
}

fn parse_condition(raw: &Value) -> Result<Vec<FieldOp>> {
	let Some(obj) = raw.as_object() else {
		return Ok(vec![FieldOp::Eq(raw.clone())]);
	};

	if obj.is_empty() || !obj.keys().all(|key| key.starts_with('$')) || value::as_date(raw).is_some()
	{
		return Ok(vec![FieldOp::Eq(raw.clone())]);
	}

	let mut ops = Vec::new();

	for (op, operand) in obj {
		match op.as_str() {
			"$eq" => ops.push(FieldOp::Eq(operand.clone())),
			"$ne" => ops.push(FieldOp::Ne(operand.clone())),
			"$gt" => ops.push(FieldOp::Gt(operand.clone())),
			"$gte" => ops.push(FieldOp::Gte(operand.clone())),
			"$lt" => ops.push(FieldOp::Lt(operand.clone())),
			"$lte" => ops.push(FieldOp::Lte(operand.clone())),
			"$in" => ops.push(FieldOp::In(operand_list(op, operand)?)),
			"$nin" => ops.push(FieldOp::Nin(operand_list(op, operand)?)),
			"$exists" => ops.push(FieldOp::Exists(truthy(operand))),
			"$regex" => {
				let options = obj.get("$options").and_then(Value::as_str).unwrap_or("");

				ops.push(FieldOp::Regex(compile_regex(operand, options)?));
			},
			"$options" => {},
			"$not" => ops.push(FieldOp::Not(parse_condition(operand)?)),
			other => return Err(Error::InvalidQuery(format!("Unsupported field operator {other}."))),
		}
	}

	Ok(ops)
}

fn operand_list(op: &str, operand: &Value) -> Result<Vec<Value>> {
	operand
		.as_array()
		.cloned()
		.ok_or_else(|| Error::InvalidQuery(format!("{op} expects an array.")))
}

fn compile_regex(pattern: &Value, options: &str) -> Result<Regex> {
	let Some(pattern) = pattern.as_str() else {
		return Err(Error::InvalidQuery("$regex expects a string pattern.".to_string()));
	};

	RegexBuilder::new(pattern)
		.case_insensitive(options.contains('i'))
		.multi_line(options.contains('m'))
		.dot_matches_new_line(options.contains('s'))
		.ignore_whitespace(options.contains('x'))
		.build()
		.map_err(|err| Error::InvalidQuery(format!("Invalid $regex pattern: {err}.")))
}

fn truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(flag) => *flag,
		Value::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
		_ => true,
	}
}

/// Candidates plus the elements of any array candidates.
fn flatten<'a>(candidates: &[&'a Value]) -> Vec<&'a Value> {
	let mut out = Vec::with_capacity(candidates.len());

	for candidate in candidates {
		out.push(*candidate);

		if let Value::Array(items) = candidate {
			out.extend(items.iter());
		}
	}

	out
}

fn eq_any(candidates: &[&Value], expected: &Value) -> bool {
	if candidates.is_empty() {
		return expected.is_null();
	}

	flatten(candidates).into_iter().any(|candidate| values_equal(candidate, expected))
}

fn cmp_any(candidates: &[&Value], bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
	flatten(candidates).into_iter().any(|candidate| {
		value::type_rank(candidate) == value::type_rank(bound) && accept(compare_values(candidate, bound))
	})
}
