use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{
	Error, Result,
	hooks::ResourceHooks,
	preprocess::{Paths, SchemaDescriptor, preprocess},
	report::ReportSchema,
	schema::ResourceSchema,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ListField {
	pub field: String,
	#[serde(default)]
	pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Localisation {
	pub from: String,
	pub to: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context: Option<String>,
}

/// Declared search priority. Lower ranks are searched and listed first.
///
/// An explicit `0` is `Priority(0)`: it ranks ahead of every other priority and switches the
/// registry to sequential search. It is not read as "unset", so a resource that wants the
/// default rank must omit the option or send `null`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchImportance {
	#[default]
	Unset,
	/// Excluded from search.
	Disabled,
	Priority(u32),
}
impl SearchImportance {
	pub const DEFAULT_RANK: u32 = 99;

	pub fn rank(self) -> u32 {
		match self {
			Self::Priority(rank) => rank,
			Self::Unset | Self::Disabled => Self::DEFAULT_RANK,
		}
	}

	pub fn is_searchable(self) -> bool {
		self != Self::Disabled
	}

	pub fn is_priority(self) -> bool {
		matches!(self, Self::Priority(_))
	}

	pub fn is_unset(&self) -> bool {
		*self == Self::Unset
	}
}

impl Serialize for SearchImportance {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match self {
			Self::Unset => serializer.serialize_none(),
			Self::Disabled => serializer.serialize_bool(false),
			Self::Priority(rank) => serializer.serialize_u32(*rank),
		}
	}
}

impl<'de> Deserialize<'de> for SearchImportance {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		match Value::deserialize(deserializer)? {
			Value::Null => Ok(Self::Unset),
			Value::Bool(false) => Ok(Self::Disabled),
			Value::Number(number) => number
				.as_u64()
				.and_then(|rank| u32::try_from(rank).ok())
				.map(Self::Priority)
				.ok_or_else(|| serde::de::Error::custom("searchImportance must be a non-negative integer.")),
			_ => Err(serde::de::Error::custom("searchImportance must be an integer or false.")),
		}
	}
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOptions {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub list_fields: Vec<ListField>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub hide: Vec<String>,
	#[serde(default, skip_serializing_if = "SearchImportance::is_unset")]
	pub search_importance: SearchImportance,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub search_order: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub list_order: Option<Value>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub localisation_data: Vec<Localisation>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// A registered document type. Options are final once the resource is built.
#[derive(Debug, Clone)]
pub struct Resource {
	pub name: String,
	pub collection: String,
	pub schema: ResourceSchema,
	pub options: ResourceOptions,
	pub hooks: ResourceHooks,
	descriptor: SchemaDescriptor,
}
impl Resource {
	/// Preprocesses the schema and folds its hidden and list fields into `options`. Every declared
	/// form is checked here so that a bad override fails at registration.
	pub fn new(
		name: impl Into<String>,
		schema: ResourceSchema,
		mut options: ResourceOptions,
	) -> Result<Self> {
		let name = name.into();

		if name.trim().is_empty() || name.contains('/') {
			return Err(Error::Configuration {
				message: format!("Resource name {name:?} must be non-empty and contain no '/'."),
			});
		}

		let descriptor = preprocess(&schema.fields, None)?;

		for form in schema.forms.values() {
			preprocess(&schema.fields, Some(form))?;
		}
		for hidden in &descriptor.hide {
			if !options.hide.contains(hidden) {
				options.hide.push(hidden.clone());
			}
		}

		if !descriptor.list_fields.is_empty() {
			options.list_fields = descriptor.list_fields.clone();
		}

		Ok(Self {
			collection: name.clone(),
			name,
			schema,
			options,
			hooks: ResourceHooks::default(),
			descriptor,
		})
	}

	pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
		self.collection = collection.into();

		self
	}

	pub fn with_hooks(mut self, hooks: ResourceHooks) -> Self {
		self.hooks = hooks;

		self
	}

	pub fn descriptor(&self) -> &SchemaDescriptor {
		&self.descriptor
	}

	pub fn hidden_fields(&self) -> &[String] {
		&self.options.hide
	}

	pub fn search_importance(&self) -> SearchImportance {
		self.options.search_importance
	}

	/// Descriptor paths, narrowed by a named form when one is given. `None` means the form is not
	/// declared.
	pub fn form_paths(&self, form: Option<&str>) -> Result<Option<Paths>> {
		let Some(form) = form else {
			return Ok(Some(self.descriptor.paths.clone()));
		};
		let Some(overrides) = self.schema.forms.get(form) else {
			return Ok(None);
		};

		Ok(Some(preprocess(&self.schema.fields, Some(overrides))?.paths))
	}

	pub fn report(&self, name: &str) -> Option<&ReportSchema> {
		self.schema.reports.get(name)
	}

	/// Leading fields of compound indexes, then individually indexed fields not marked
	/// `noSearch`, without duplicates.
	pub fn search_fields(&self) -> Vec<String> {
		let mut fields: Vec<String> = Vec::new();

		for index in &self.schema.indexes {
			if let Some(first) = index.fields.first()
				&& !fields.contains(first)
			{
				fields.push(first.clone());
			}
		}
		for field in &self.schema.fields {
			if field.name != "_id" && field.index && !field.no_search && !fields.contains(&field.name)
			{
				fields.push(field.name.clone());
			}
		}

		fields
	}
}
