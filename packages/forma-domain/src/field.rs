use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coarse storage type of a field, fixed when the schema is declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FieldType {
	#[default]
	String,
	Number,
	Boolean,
	Date,
	ObjectId,
	Mixed,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
	pub name: String,
	#[serde(default, rename = "type")]
	pub field_type: FieldType,
	#[serde(default)]
	pub array: bool,
	#[serde(default)]
	pub index: bool,
	#[serde(default)]
	pub no_search: bool,
	#[serde(default)]
	pub secure: bool,
	#[serde(default)]
	pub required: bool,
	#[serde(default, rename = "match", deserialize_with = "deserialize_pattern")]
	pub pattern: Option<Regex>,
	#[serde(default)]
	pub list: Option<Value>,
	#[serde(default)]
	pub form: Option<Value>,
	#[serde(default, rename = "enum")]
	pub enum_values: Option<Vec<Value>>,
	#[serde(default, rename = "ref")]
	pub reference: Option<String>,
	#[serde(default)]
	pub schema: Option<Vec<FieldDef>>,
}
impl FieldDef {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			array: false,
			index: false,
			no_search: false,
			secure: false,
			required: false,
			pattern: None,
			list: None,
			form: None,
			enum_values: None,
			reference: None,
			schema: None,
		}
	}

	pub fn indexed(mut self) -> Self {
		self.index = true;

		self
	}

	pub fn no_search(mut self) -> Self {
		self.no_search = true;

		self
	}

	pub fn secure(mut self) -> Self {
		self.secure = true;

		self
	}

	pub fn required(mut self) -> Self {
		self.required = true;

		self
	}

	pub fn array(mut self) -> Self {
		self.array = true;

		self
	}

	pub fn list(mut self, params: Value) -> Self {
		self.list = Some(params);

		self
	}

	pub fn form(mut self, options: Value) -> Self {
		self.form = Some(options);

		self
	}

	pub fn pattern(mut self, pattern: Regex) -> Self {
		self.pattern = Some(pattern);

		self
	}

	pub fn one_of(mut self, values: Vec<Value>) -> Self {
		self.enum_values = Some(values);

		self
	}

	pub fn reference(mut self, resource: impl Into<String>) -> Self {
		self.reference = Some(resource.into());

		self
	}

	/// Turns the field into a sub-document holding `fields`.
	pub fn sub_schema(mut self, fields: Vec<FieldDef>) -> Self {
		self.schema = Some(fields);

		self
	}
}

fn deserialize_pattern<'de, D>(deserializer: D) -> Result<Option<Regex>, D::Error>
where
	D: Deserializer<'de>,
{
	let Some(source) = Option::<String>::deserialize(deserializer)? else {
		return Ok(None);
	};

	Regex::new(&source).map(Some).map_err(serde::de::Error::custom)
}
