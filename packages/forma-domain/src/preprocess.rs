//! Flattens declared fields into the descriptor tree sent to form builders.
//!
//! Secure fields never appear in a descriptor. Their names are collected in `hide` instead, with
//! sub-document fields recorded as `parent.child`.

use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::{Map, Value};

use crate::{
	Error, Result,
	field::{FieldDef, FieldType},
	resource::ListField,
	schema::FormOverride,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDescriptor {
	pub paths: Paths,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub hide: Vec<String>,
	#[serde(rename = "listFields", skip_serializing_if = "Vec::is_empty")]
	pub list_fields: Vec<ListField>,
}

/// Field name to descriptor, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paths(Vec<(String, PathDescriptor)>);
impl Paths {
	pub fn get(&self, name: &str) -> Option<&PathDescriptor> {
		self.0.iter().find(|(key, _)| key == name).map(|(_, descriptor)| descriptor)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(|(key, _)| key.as_str())
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &PathDescriptor)> {
		self.0.iter().map(|(key, descriptor)| (key.as_str(), descriptor))
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl Serialize for Paths {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut map = serializer.serialize_map(Some(self.0.len()))?;

		for (key, descriptor) in &self.0 {
			map.serialize_entry(key, descriptor)?;
		}

		map.end()
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PathDescriptor {
	Field {
		path: String,
		instance: FieldType,
		#[serde(skip_serializing_if = "is_false")]
		array: bool,
		options: Map<String, Value>,
	},
	SubSchema {
		schema: Paths,
		#[serde(skip_serializing_if = "Map::is_empty")]
		options: Map<String, Value>,
	},
}
impl PathDescriptor {
	pub fn options(&self) -> &Map<String, Value> {
		match self {
			Self::Field { options, .. } | Self::SubSchema { options, .. } => options,
		}
	}

	fn merge_form(&mut self, overrides: &Map<String, Value>) {
		let options = match self {
			Self::Field { options, .. } | Self::SubSchema { options, .. } => options,
		};
		let form = options.entry("form").or_insert_with(|| Value::Object(Map::new()));

		if !form.is_object() {
			*form = Value::Object(Map::new());
		}

		if let Value::Object(form) = form {
			for (key, value) in overrides {
				form.insert(key.clone(), value.clone());
			}
		}
	}
}

/// Builds the descriptor for `fields`. With a form override, only the named fields are kept, in
/// override order, and each entry's options are merged into that field's form options.
pub fn preprocess(fields: &[FieldDef], form: Option<&FormOverride>) -> Result<SchemaDescriptor> {
	let mut paths = Vec::with_capacity(fields.len());
	let mut hide = Vec::new();
	let mut list_fields = Vec::new();

	for field in fields {
		if field.secure {
			hide.push(field.name.clone());

			continue;
		}

		if let Some(children) = &field.schema {
			let nested = preprocess(children, None)?;
			let mut options = Map::new();

			hide.extend(nested.hide.into_iter().map(|child| format!("{}.{child}", field.name)));

			if let Some(form) = &field.form {
				options.insert("form".to_string(), form.clone());
			}

			paths.push((field.name.clone(), PathDescriptor::SubSchema { schema: nested.paths, options }));

			continue;
		}

		if let Some(params) = &field.list {
			list_fields.push(ListField { field: field.name.clone(), params: params.clone() });
		}

		paths.push((
			field.name.clone(),
			PathDescriptor::Field {
				path: field.name.clone(),
				instance: field.field_type,
				array: field.array,
				options: field_options(field),
			},
		));
	}

	let mut paths = Paths(paths);

	if let Some(form) = form {
		paths = apply_form(&paths, form)?;
	}

	Ok(SchemaDescriptor { paths, hide, list_fields })
}

fn apply_form(base: &Paths, form: &FormOverride) -> Result<Paths> {
	let mut out = Vec::with_capacity(form.len());

	for (name, overrides) in form {
		let Some(descriptor) = base.get(name) else {
			return Err(Error::Configuration {
				message: format!(
					"No such field as {name}. Is it part of a sub-doc? If so you need the bit before the period."
				),
			});
		};
		let mut descriptor = descriptor.clone();

		if let Some(overrides) = overrides.as_object() {
			descriptor.merge_form(overrides);
		}

		out.push((name.clone(), descriptor));
	}

	Ok(Paths(out))
}

fn field_options(field: &FieldDef) -> Map<String, Value> {
	let mut options = Map::new();

	if field.index {
		options.insert("index".to_string(), Value::Bool(true));
	}
	if field.no_search {
		options.insert("noSearch".to_string(), Value::Bool(true));
	}
	if field.required {
		options.insert("required".to_string(), Value::Bool(true));
	}
	if let Some(pattern) = &field.pattern {
		options.insert("match".to_string(), Value::String(pattern.as_str().to_string()));
	}
	if let Some(values) = &field.enum_values {
		options.insert("enum".to_string(), Value::Array(values.clone()));
	}
	if let Some(reference) = &field.reference {
		options.insert("ref".to_string(), Value::String(reference.clone()));
	}
	if let Some(list) = &field.list {
		options.insert("list".to_string(), list.clone());
	}
	if let Some(form) = &field.form {
		options.insert("form".to_string(), form.clone());
	}

	options
}

fn is_false(flag: &bool) -> bool {
	!*flag
}
