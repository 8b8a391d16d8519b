//! List, create, read, update and delete handlers for a resource's records.

use forma_domain::{RequestContext, Resource};
use forma_storage::{Projection, value};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{
	Error, FormaService, Result,
	find::{self, FindParams},
};

/// Raw list parameters. Each one is a JSON document.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ListQuery {
	/// Aggregation whose `_id`s restrict the listing.
	pub a: Option<String>,
	/// Filter.
	pub f: Option<String>,
	/// Limit.
	pub l: Option<String>,
	/// Skip.
	pub s: Option<String>,
	/// Order. Defaults to the resource's `listOrder`.
	pub o: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeleteResponse {
	pub success: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EntityListResponse {
	pub list: String,
}

impl FormaService {
	pub async fn list_records(
		&self,
		ctx: &RequestContext,
		resource: &str,
		query: &ListQuery,
	) -> Result<Vec<Value>> {
		let resource = self.resource(resource)?;
		let params = FindParams {
			aggregation: parse_param::<Vec<Value>>("a", query.a.as_deref())?,
			filter: parse_param("f", query.f.as_deref())?,
			sort: parse_param::<Value>("o", query.o.as_deref())?
				.or_else(|| resource.options.list_order.clone()),
			limit: parse_param("l", query.l.as_deref())?,
			skip: parse_param("s", query.s.as_deref())?,
		};

		find::filtered_find(self.store.as_ref(), resource, ctx, params).await
	}

	pub async fn get_record(&self, resource: &str, id: &str) -> Result<Value> {
		let resource = self.resource(resource)?;

		self.load_visible(resource, id).await
	}

	pub async fn create_record(
		&self,
		ctx: &RequestContext,
		resource: &str,
		body: Value,
	) -> Result<Value> {
		let resource = self.resource(resource)?;
		let mut doc = cleanse(resource, body)?;

		validate(resource, &doc)?;
		run_save_hook(resource, &mut doc, ctx).await?;

		let mut saved = self.store.insert(&resource.collection, doc).await?;

		strip_hidden(resource, &mut saved);

		Ok(saved)
	}

	/// Merges the body onto the stored record. Empty strings unset a field and hidden fields keep
	/// their stored values.
	pub async fn update_record(
		&self,
		ctx: &RequestContext,
		resource: &str,
		id: &str,
		body: Value,
	) -> Result<Value> {
		let resource = self.resource(resource)?;
		let changes = cleanse(resource, body)?;
		let Some(mut doc) = self.store.find_one(&resource.collection, id, &Projection::All).await?
		else {
			return Err(record_not_found());
		};

		if let (Value::Object(target), Value::Object(changes)) = (&mut doc, changes) {
			for (name, value) in changes {
				if name == "_id" {
					continue;
				}

				if value.as_str() == Some("") {
					target.retain(|key, _| key != &name);
				} else {
					target.insert(name, value);
				}
			}
		}

		validate(resource, &doc)?;
		run_save_hook(resource, &mut doc, ctx).await?;

		let mut saved = self.store.replace(&resource.collection, id, doc).await?;

		strip_hidden(resource, &mut saved);

		Ok(saved)
	}

	pub async fn delete_record(&self, resource: &str, id: &str) -> Result<DeleteResponse> {
		let resource = self.resource(resource)?;

		self.store.remove(&resource.collection, id).await.map_err(|err| match err {
			forma_storage::Error::NotFound(_) => record_not_found(),
			other => Error::from(other),
		})?;

		Ok(DeleteResponse { success: true })
	}

	/// The record's display string.
	pub async fn entity_list(&self, resource: &str, id: &str) -> Result<EntityListResponse> {
		let resource = self.resource(resource)?;
		let doc = self.load_visible(resource, id).await?;

		Ok(EntityListResponse { list: resource.display_text(&doc) })
	}

	async fn load_visible(&self, resource: &Resource, id: &str) -> Result<Value> {
		let projection = Projection::exclude(resource.hidden_fields().iter().cloned());

		self.store
			.find_one(&resource.collection, id, &projection)
			.await?
			.ok_or_else(record_not_found)
	}
}

fn record_not_found() -> Error {
	Error::NotFound { message: "Record not found".to_string() }
}

fn parse_param<T>(name: &str, raw: Option<&str>) -> Result<Option<T>>
where
	T: DeserializeOwned,
{
	let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) else {
		return Ok(None);
	};

	serde_json::from_str(raw).map(Some).map_err(|err| Error::MalformedQuery {
		message: format!("The {name} parameter is not valid: {err}"),
	})
}

/// Drops hidden fields from an incoming body so they cannot be written.
fn cleanse(resource: &Resource, body: Value) -> Result<Value> {
	if !body.is_object() {
		return Err(Error::MalformedQuery {
			message: "The request body must be a JSON object.".to_string(),
		});
	}

	let mut body = body;

	strip_hidden(resource, &mut body);

	Ok(body)
}

fn strip_hidden(resource: &Resource, doc: &mut Value) {
	for field in resource.hidden_fields() {
		value::remove_path(doc, field);
	}
}

/// Checks required fields, `match` patterns and `enum` values of top-level fields.
fn validate(resource: &Resource, doc: &Value) -> Result<()> {
	let empty = Map::new();
	let obj = doc.as_object().unwrap_or(&empty);

	for field in &resource.schema.fields {
		let current = obj.get(&field.name).filter(|value| !value.is_null());

		if field.required && current.is_none_or(|value| value.as_str() == Some("")) {
			return Err(Error::Validation {
				field: field.name.clone(),
				message: "Path is required.".to_string(),
			});
		}

		let Some(current) = current else {
			continue;
		};

		if let Some(pattern) = &field.pattern
			&& let Some(text) = current.as_str()
			&& !pattern.is_match(text)
		{
			return Err(Error::Validation {
				field: field.name.clone(),
				message: format!("{text:?} does not match {}.", pattern.as_str()),
			});
		}
		if let Some(allowed) = &field.enum_values
			&& !allowed.iter().any(|candidate| value::values_equal(candidate, current))
		{
			return Err(Error::Validation {
				field: field.name.clone(),
				message: format!("{current} is not an allowed value."),
			});
		}
	}

	Ok(())
}

async fn run_save_hook(resource: &Resource, doc: &mut Value, ctx: &RequestContext) -> Result<()> {
	let Some(hook) = &resource.hooks.save else {
		return Ok(());
	};

	hook.before_save(doc, ctx).await.map_err(|err| {
		tracing::warn!(resource = %resource.name, error = %err, "Save hook rejected the record.");

		Error::Hook { message: err.to_string() }
	})
}

#[cfg(test)]
mod tests {
	use forma_domain::{FieldDef, FieldType, ResourceOptions, ResourceSchema};
	use regex::Regex;
	use serde_json::json;

	use super::*;

	fn people() -> Resource {
		let schema = ResourceSchema::new(vec![
			FieldDef::new("name", FieldType::String).required(),
			FieldDef::new("email", FieldType::String)
				.pattern(Regex::new("^[^@]+@[^@]+$").expect("Pattern must compile.")),
			FieldDef::new("grade", FieldType::String).one_of(vec![json!("A"), json!("B")]),
			FieldDef::new("pin", FieldType::Number).secure(),
		]);

		Resource::new("people", schema, ResourceOptions::default()).expect("Resource must build.")
	}

	#[test]
	fn validation_checks_required_patterns_and_enums() {
		let resource = people();

		assert!(validate(&resource, &json!({ "name": "Jo", "email": "jo@x", "grade": "A" })).is_ok());
		assert!(matches!(
			validate(&resource, &json!({ "name": "" })),
			Err(Error::Validation { ref field, .. }) if field == "name"
		));
		assert!(matches!(
			validate(&resource, &json!({ "name": "Jo", "email": "nope" })),
			Err(Error::Validation { ref field, .. }) if field == "email"
		));
		assert!(matches!(
			validate(&resource, &json!({ "name": "Jo", "grade": "C" })),
			Err(Error::Validation { ref field, .. }) if field == "grade"
		));
	}

	#[test]
	fn cleanse_drops_hidden_fields_and_rejects_non_objects() {
		let resource = people();

		assert_eq!(
			cleanse(&resource, json!({ "name": "Jo", "pin": 1 })).expect("Body must cleanse."),
			json!({ "name": "Jo" })
		);
		assert!(matches!(cleanse(&resource, json!([1])), Err(Error::MalformedQuery { .. })));
	}

	#[test]
	fn list_parameters_must_be_json() {
		assert_eq!(parse_param::<usize>("l", Some("5")).expect("Limit must parse."), Some(5));
		assert!(matches!(parse_param::<usize>("l", Some("five")), Err(Error::MalformedQuery { .. })));
		assert_eq!(parse_param::<Value>("o", None).expect("Absent order is fine."), None);
	}
}
