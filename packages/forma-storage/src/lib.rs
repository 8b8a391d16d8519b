pub mod memory;
pub mod pg;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod value;

mod error;

pub use error::Error;
pub use memory::MemoryStore;
pub use pg::PgStore;
pub use query::{FindQuery, Projection, SortKey, SortSpec};

use std::{future::Future, pin::Pin};

use serde_json::Value;

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Document collections addressed by name. Documents are JSON objects keyed by `_id`.
pub trait DocumentStore
where
	Self: Send + Sync,
{
	fn find<'a>(
		&'a self,
		collection: &'a str,
		query: &'a FindQuery,
	) -> BoxFuture<'a, Result<Vec<Value>>>;

	fn find_one<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		projection: &'a Projection,
	) -> BoxFuture<'a, Result<Option<Value>>>;

	fn aggregate<'a>(
		&'a self,
		collection: &'a str,
		pipeline: &'a [Value],
	) -> BoxFuture<'a, Result<Vec<Value>>>;

	/// Stores a new document, assigning an `_id` when the document has none. Returns the stored
	/// document.
	fn insert<'a>(&'a self, collection: &'a str, doc: Value) -> BoxFuture<'a, Result<Value>>;

	fn replace<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		doc: Value,
	) -> BoxFuture<'a, Result<Value>>;

	fn remove<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Gives `doc` a fresh `_id` when it has none and returns the id in its string form.
pub fn ensure_id(doc: &mut Value) -> Result<String> {
	let Some(obj) = doc.as_object_mut() else {
		return Err(Error::InvalidQuery("Documents must be JSON objects.".to_string()));
	};

	if let Some(id) = obj.get("_id").filter(|id| !id.is_null()) {
		return Ok(value::id_string(id));
	}

	let id = uuid::Uuid::new_v4().simple().to_string();

	obj.insert("_id".to_string(), Value::String(id.clone()));

	Ok(id)
}
