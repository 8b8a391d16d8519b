use forma_storage::value;
use serde_json::Value;

use crate::resource::Resource;

impl Resource {
	/// Display string for a record: the list field values joined by spaces. Without declared list
	/// fields the first two non-secure schema fields are used. Missing values render empty.
	pub fn display_text(&self, doc: &Value) -> String {
		let names: Vec<&str> = if self.options.list_fields.is_empty() {
			self.schema
				.fields
				.iter()
				.filter(|field| field.name != "_id" && !field.secure)
				.take(2)
				.map(|field| field.name.as_str())
				.collect()
		} else {
			self.options.list_fields.iter().map(|list| list.field.as_str()).collect()
		};
		let parts: Vec<String> = names
			.into_iter()
			.map(|name| value::lookup_path(doc, name).map(value::display_string).unwrap_or_default())
			.collect();

		parts.join(" ").trim().to_string()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use crate::{
		field::{FieldDef, FieldType},
		resource::{Resource, ResourceOptions},
		schema::ResourceSchema,
	};

	#[test]
	fn list_fields_drive_the_display_string() {
		let schema = ResourceSchema::new(vec![
			FieldDef::new("title", FieldType::String),
			FieldDef::new("surname", FieldType::String).list(json!({})),
			FieldDef::new("forename", FieldType::String).list(json!({})),
		]);
		let resource =
			Resource::new("owners", schema, ResourceOptions::default()).expect("Resource must build.");

		assert_eq!(
			resource.display_text(&json!({ "title": "Dr", "surname": "Smith", "forename": "Jo" })),
			"Smith Jo"
		);
		assert_eq!(resource.display_text(&json!({ "forename": "Jo" })), "Jo");
	}

	#[test]
	fn first_two_fields_are_used_without_list_fields() {
		let schema = ResourceSchema::new(vec![
			FieldDef::new("pin", FieldType::Number).secure(),
			FieldDef::new("make", FieldType::String),
			FieldDef::new("model", FieldType::String),
			FieldDef::new("year", FieldType::Number),
		]);
		let resource =
			Resource::new("cars", schema, ResourceOptions::default()).expect("Resource must build.");

		assert_eq!(
			resource.display_text(&json!({ "make": "Ford", "model": "Ka", "year": 2001 })),
			"Ford Ka"
		);
	}
}
