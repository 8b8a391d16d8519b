use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Parameter slots in declaration order.
pub type ReportParams = IndexMap<String, ReportParam>;

/// Aggregation report template. Placeholders are string values or object keys of the form
/// `"(name)"`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSchema {
	#[serde(default)]
	pub pipeline: Vec<Value>,
	#[serde(default, skip_serializing_if = "IndexMap::is_empty")]
	pub params: ReportParams,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column_translations: Option<Vec<ColumnTranslation>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub drilldown: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl ReportSchema {
	pub fn from_pipeline(pipeline: Vec<Value>) -> Self {
		Self { pipeline, ..Default::default() }
	}
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReportParam {
	#[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
	pub param_type: Option<String>,
	#[serde(default)]
	pub value: Value,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl ReportParam {
	pub fn is_number(&self) -> bool {
		self.param_type.as_deref() == Some("number")
	}
}

/// Rewrites a result column from raw values to labels, either from a static list or from the
/// display text of another resource's records.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColumnTranslation {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub field: Option<String>,
	#[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
	pub reference: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub translations: Option<Vec<TranslationRule>>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranslationRule {
	pub value: Value,
	pub display: Value,
}
