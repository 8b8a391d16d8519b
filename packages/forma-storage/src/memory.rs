use std::{collections::BTreeMap, sync::RwLock};

use serde_json::Value;

use crate::{
	BoxFuture, DocumentStore, Error, FindQuery, Projection, Result, pipeline, query,
	value::id_matches,
};

/// Process-local collections. Insertion order is the natural order of a collection.
#[derive(Default)]
pub struct MemoryStore {
	collections: RwLock<BTreeMap<String, Vec<Value>>>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self, collection: &str) -> bool {
		let collections = self.collections.read().unwrap_or_else(|err| err.into_inner());

		collections.get(collection).map(Vec::is_empty).unwrap_or(true)
	}

	/// Inserts every document in order, assigning ids where missing.
	pub fn seed<I>(&self, collection: &str, docs: I) -> Result<usize>
	where
		I: IntoIterator<Item = Value>,
	{
		let mut inserted = 0;

		for doc in docs {
			self.insert_sync(collection, doc)?;

			inserted += 1;
		}

		Ok(inserted)
	}

	fn snapshot(&self, collection: &str) -> Vec<Value> {
		let collections = self.collections.read().unwrap_or_else(|err| err.into_inner());

		collections.get(collection).cloned().unwrap_or_default()
	}

	fn insert_sync(&self, collection: &str, mut doc: Value) -> Result<Value> {
		let id = crate::ensure_id(&mut doc)?;
		let mut collections = self.collections.write().unwrap_or_else(|err| err.into_inner());
		let docs = collections.entry(collection.to_string()).or_default();

		if docs.iter().any(|existing| id_matches(existing, &id)) {
			return Err(Error::Conflict(format!("{collection} already holds a document with _id {id}.")));
		}

		docs.push(doc.clone());

		Ok(doc)
	}
}

impl DocumentStore for MemoryStore {
	fn find<'a>(
		&'a self,
		collection: &'a str,
		query: &'a FindQuery,
	) -> BoxFuture<'a, Result<Vec<Value>>> {
		Box::pin(async move { query::apply_find(self.snapshot(collection), query) })
	}

	fn find_one<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		projection: &'a Projection,
	) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move {
			let found = self.snapshot(collection).into_iter().find(|doc| id_matches(doc, id));

			Ok(found.map(|mut doc| {
				projection.apply(&mut doc);

				doc
			}))
		})
	}

	fn aggregate<'a>(
		&'a self,
		collection: &'a str,
		pipeline: &'a [Value],
	) -> BoxFuture<'a, Result<Vec<Value>>> {
		Box::pin(async move { pipeline::run_pipeline(self.snapshot(collection), pipeline) })
	}

	fn insert<'a>(&'a self, collection: &'a str, doc: Value) -> BoxFuture<'a, Result<Value>> {
		Box::pin(async move { self.insert_sync(collection, doc) })
	}

	fn replace<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		mut doc: Value,
	) -> BoxFuture<'a, Result<Value>> {
		Box::pin(async move {
			let Some(obj) = doc.as_object_mut() else {
				return Err(Error::InvalidQuery("Documents must be JSON objects.".to_string()));
			};
			let mut collections = self.collections.write().unwrap_or_else(|err| err.into_inner());
			let Some(slot) = collections
				.get_mut(collection)
				.and_then(|docs| docs.iter_mut().find(|existing| id_matches(existing, id)))
			else {
				return Err(Error::NotFound(format!("No document {id} in {collection}.")));
			};

			if let Some(existing_id) = slot.get("_id").cloned() {
				obj.insert("_id".to_string(), existing_id);
			}

			*slot = doc.clone();

			Ok(doc)
		})
	}

	fn remove<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut collections = self.collections.write().unwrap_or_else(|err| err.into_inner());
			let docs = collections.get_mut(collection);
			let Some(pos) =
				docs.as_ref().and_then(|docs| docs.iter().position(|existing| id_matches(existing, id)))
			else {
				return Err(Error::NotFound(format!("No document {id} in {collection}.")));
			};

			if let Some(docs) = docs {
				docs.remove(pos);
			}

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn insert_assigns_ids_and_rejects_duplicates() {
		let store = MemoryStore::new();
		let stored = store.insert("cars", json!({ "make": "Ford" })).await.expect("Insert must work.");

		assert!(stored.get("_id").and_then(Value::as_str).is_some());

		store.insert("cars", json!({ "_id": "x", "make": "Audi" })).await.expect("Insert must work.");

		let err = store.insert("cars", json!({ "_id": "x" })).await.expect_err("Duplicate id.");

		assert!(matches!(err, Error::Conflict(_)));
	}

	#[tokio::test]
	async fn replace_keeps_the_stored_id_and_remove_deletes() {
		let store = MemoryStore::new();

		store.seed("cars", [json!({ "_id": "x", "make": "Ford" })]).expect("Seed must work.");

		let replaced = store
			.replace("cars", "x", json!({ "make": "Audi" }))
			.await
			.expect("Replace must work.");

		assert_eq!(replaced, json!({ "make": "Audi", "_id": "x" }));

		store.remove("cars", "x").await.expect("Remove must work.");

		assert!(store.is_empty("cars"));
		assert!(matches!(store.remove("cars", "x").await, Err(Error::NotFound(_))));
	}
}
