use std::{collections::BTreeMap, fmt, sync::Arc};

use forma_storage::BoxFuture;
use serde_json::{Map, Value};

/// What a hook can see of the request it runs for.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
	pub resource: String,
	pub query: Vec<(String, String)>,
	/// Header names are lower case.
	pub headers: BTreeMap<String, String>,
}
impl RequestContext {
	pub fn new(resource: impl Into<String>) -> Self {
		Self { resource: resource.into(), ..Default::default() }
	}

	pub fn query_param(&self, name: &str) -> Option<&str> {
		self.query.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Supplies a per-request base filter for every query against a resource.
pub trait FindHook
where
	Self: Send + Sync,
{
	fn filter<'a>(
		&'a self,
		ctx: &'a RequestContext,
	) -> BoxFuture<'a, Result<Option<Value>, HookError>>;
}

/// Runs before a document is stored. Returning an error rejects the write.
pub trait SaveHook
where
	Self: Send + Sync,
{
	fn before_save<'a>(
		&'a self,
		doc: &'a mut Value,
		ctx: &'a RequestContext,
	) -> BoxFuture<'a, Result<(), HookError>>;
}

/// Shapes a matched document into a search result entry.
pub trait SearchFormatter
where
	Self: Send + Sync,
{
	fn format(&self, doc: &Value) -> FormattedResult;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedResult {
	pub id: Value,
	pub text: String,
	pub weighting: Option<u32>,
	pub resource: Option<String>,
	pub resource_text: Option<String>,
	pub extra: Map<String, Value>,
}
impl FormattedResult {
	pub fn new(id: Value, text: impl Into<String>) -> Self {
		Self {
			id,
			text: text.into(),
			weighting: None,
			resource: None,
			resource_text: None,
			extra: Map::new(),
		}
	}
}

#[derive(Clone, Default)]
pub struct ResourceHooks {
	pub find: Option<Arc<dyn FindHook>>,
	pub save: Option<Arc<dyn SaveHook>>,
	pub search_format: Option<Arc<dyn SearchFormatter>>,
}
impl fmt::Debug for ResourceHooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ResourceHooks")
			.field("find", &self.find.is_some())
			.field("save", &self.save.is_some())
			.field("search_format", &self.search_format.is_some())
			.finish()
	}
}
