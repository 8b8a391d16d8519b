//! Parameter substitution and date coercion over parsed pipelines.

use std::sync::LazyLock;

use forma_domain::ReportParams;
use forma_storage::value;
use regex::Regex;
use serde_json::{Map, Number, Value};
use time::{PrimitiveDateTime, macros::format_description};

use crate::{Error, Result};

static TIMESTAMP: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3})(Z|[+ -]\d{4})$").ok()
});

/// Copies every query parameter except `r` into its slot.
pub(super) fn assign_query_params(params: &mut ReportParams, query: &[(String, String)]) -> Result<()> {
	for (name, value) in query {
		if name == "r" {
			continue;
		}

		let Some(slot) = params.get_mut(name) else {
			return Err(Error::UnknownParameter { name: name.clone() });
		};

		slot.value = Value::String(value.clone());
	}

	Ok(())
}

/// Replaces every string value or object key of the form `"(name)"` with the value of
/// parameter `name`.
pub(super) fn substitute(pipeline: &[Value], params: &ReportParams) -> Result<Vec<Value>> {
	pipeline.iter().map(|stage| substitute_value(stage, params)).collect()
}

fn substitute_value(value: &Value, params: &ReportParams) -> Result<Value> {
	match value {
		Value::String(text) => match placeholder_name(text) {
			Some(name) => resolve(name, params),
			None => Ok(value.clone()),
		},
		Value::Array(items) => items
			.iter()
			.map(|item| substitute_value(item, params))
			.collect::<Result<Vec<_>>>()
			.map(Value::Array),
		Value::Object(obj) => {
			let mut out = Map::with_capacity(obj.len());

			for (key, item) in obj {
				let key = match placeholder_name(key) {
					Some(name) => key_string(resolve(name, params)?),
					None => key.clone(),
				};

				out.insert(key, substitute_value(item, params)?);
			}

			Ok(Value::Object(out))
		},
		_ => Ok(value.clone()),
	}
}

fn placeholder_name(text: &str) -> Option<&str> {
	text.strip_prefix('(')?.strip_suffix(')').filter(|name| !name.is_empty())
}

fn key_string(value: Value) -> String {
	match value {
		Value::String(text) => text,
		other => other.to_string(),
	}
}

/// Numbers for `number` parameters, structured values as they are, strings that open a JSON
/// object as that object, and anything else as a string.
fn resolve(name: &str, params: &ReportParams) -> Result<Value> {
	let Some(param) = params.get(name) else {
		return Err(Error::UnknownParameter { name: name.to_string() });
	};
	let invalid = |message: String| Error::InvalidParameterValue { name: name.to_string(), message };

	if param.is_number() {
		return match &param.value {
			Value::Number(_) => Ok(param.value.clone()),
			Value::String(text) => serde_json::from_str::<Number>(text.trim())
				.map(Value::Number)
				.map_err(|_| invalid(format!("{text:?} is not a number."))),
			other => Err(invalid(format!("{other} is not a number."))),
		};
	}

	match &param.value {
		Value::Object(_) | Value::Array(_) => Ok(param.value.clone()),
		Value::String(text) if text.starts_with('{') =>
			serde_json::from_str(text).map_err(|err| invalid(err.to_string())),
		Value::String(_) => Ok(param.value.clone()),
		Value::Null => Err(invalid("No value supplied.".to_string())),
		other => Ok(Value::String(other.to_string())),
	}
}

/// Turns timestamp strings inside `$match` stages into date values.
pub(super) fn coerce_dates(pipeline: &mut [Value]) {
	for stage in pipeline {
		if let Some(condition) = stage.get_mut("$match") {
			coerce_value(condition);
		}
	}
}

fn coerce_value(value: &mut Value) {
	let replacement = match value {
		Value::String(text) => parse_timestamp(text),
		Value::Array(items) => {
			items.iter_mut().for_each(coerce_value);

			None
		},
		Value::Object(obj) => {
			obj.values_mut().for_each(coerce_value);

			None
		},
		_ => None,
	};

	if let Some(date) = replacement {
		*value = date;
	}
}

/// `YYYY-MM-DDTHH:MM:SS.mmm` followed by `Z` or a four-digit offset. The clock time is read as
/// UTC and the offset is ignored.
fn parse_timestamp(text: &str) -> Option<Value> {
	let captures = TIMESTAMP.as_ref()?.captures(text)?;
	let local = PrimitiveDateTime::parse(
		captures.get(1)?.as_str(),
		format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"),
	)
	.ok()?;

	Some(value::date_value(local.assume_utc()))
}
