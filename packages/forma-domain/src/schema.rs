use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::{field::FieldDef, report::ReportSchema};

/// Per-field form display overrides, keyed by field name in display order.
pub type FormOverride = Map<String, Value>;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ResourceSchema {
	#[serde(default)]
	pub fields: Vec<FieldDef>,
	#[serde(default)]
	pub indexes: Vec<IndexDef>,
	#[serde(default)]
	pub forms: BTreeMap<String, FormOverride>,
	#[serde(default)]
	pub reports: BTreeMap<String, ReportSchema>,
}
impl ResourceSchema {
	pub fn new(fields: Vec<FieldDef>) -> Self {
		Self { fields, ..Default::default() }
	}

	pub fn with_index<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.indexes.push(IndexDef { fields: fields.into_iter().map(Into::into).collect() });

		self
	}

	pub fn with_form(mut self, name: impl Into<String>, form: FormOverride) -> Self {
		self.forms.insert(name.into(), form);

		self
	}

	pub fn with_report(mut self, name: impl Into<String>, report: ReportSchema) -> Self {
		self.reports.insert(name.into(), report);

		self
	}

	pub fn field(&self, name: &str) -> Option<&FieldDef> {
		self.fields.iter().find(|field| field.name == name)
	}
}

/// A compound index. Only its leading field takes part in search.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct IndexDef {
	pub fields: Vec<String>,
}
