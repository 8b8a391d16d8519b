use serde_json::Value;
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::{
	BoxFuture, DocumentStore, Error, FindQuery, Projection, Result, pipeline, query, schema,
};

/// Postgres-backed collections. Documents live in one JSONB table and are evaluated with the
/// same matcher and pipeline code as [`crate::MemoryStore`].
pub struct PgStore {
	pub pool: PgPool,
}
impl PgStore {
	pub async fn connect(cfg: &forma_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		tracing::info!(max_connections = cfg.pool_max_conns, "Connected to Postgres.");

		Ok(Self { pool })
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		let lock_id: i64 = 4_611_017;
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		let mut applied = 0_usize;

		for statement in schema::render_schema().split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			sqlx::query(trimmed).execute(&mut *tx).await?;

			applied += 1;
		}

		tx.commit().await?;

		tracing::info!(statements = applied, "Document schema is ready.");

		Ok(())
	}

	async fn load(&self, collection: &str) -> Result<Vec<Value>> {
		let docs: Vec<Value> = sqlx::query_scalar(
			"\
SELECT doc
FROM documents
WHERE collection = $1
ORDER BY seq",
		)
		.bind(collection)
		.fetch_all(&self.pool)
		.await?;

		tracing::debug!(collection, documents = docs.len(), "Loaded collection.");

		Ok(docs)
	}
}

impl DocumentStore for PgStore {
	fn find<'a>(
		&'a self,
		collection: &'a str,
		query: &'a FindQuery,
	) -> BoxFuture<'a, Result<Vec<Value>>> {
		Box::pin(async move {
			let docs = self.load(collection).await?;

			query::apply_find(docs, query)
		})
	}

	fn find_one<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		projection: &'a Projection,
	) -> BoxFuture<'a, Result<Option<Value>>> {
		Box::pin(async move {
			let found: Option<Value> =
				sqlx::query_scalar("SELECT doc FROM documents WHERE collection = $1 AND id = $2")
					.bind(collection)
					.bind(id)
					.fetch_optional(&self.pool)
					.await?;

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
		Box::pin(async move {
			let docs = self.load(collection).await?;

			pipeline::run_pipeline(docs, pipeline)
		})
	}

	fn insert<'a>(&'a self, collection: &'a str, mut doc: Value) -> BoxFuture<'a, Result<Value>> {
		Box::pin(async move {
			let id = crate::ensure_id(&mut doc)?;
			let result = sqlx::query(
				"\
INSERT INTO documents (collection, id, doc)
VALUES ($1, $2, $3)
ON CONFLICT (collection, id) DO NOTHING",
			)
			.bind(collection)
			.bind(id.as_str())
			.bind(&doc)
			.execute(&self.pool)
			.await?;

			if result.rows_affected() == 0 {
				return Err(Error::Conflict(format!(
					"{collection} already holds a document with _id {id}."
				)));
			}

			Ok(doc)
		})
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

			obj.entry("_id".to_string()).or_insert_with(|| Value::String(id.to_string()));

			let result = sqlx::query("UPDATE documents SET doc = $3 WHERE collection = $1 AND id = $2")
				.bind(collection)
				.bind(id)
				.bind(&doc)
				.execute(&self.pool)
				.await?;

			if result.rows_affected() == 0 {
				return Err(Error::NotFound(format!("No document {id} in {collection}.")));
			}

			Ok(doc)
		})
	}

	fn remove<'a>(&'a self, collection: &'a str, id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
				.bind(collection)
				.bind(id)
				.execute(&self.pool)
				.await?;

			if result.rows_affected() == 0 {
				return Err(Error::NotFound(format!("No document {id} in {collection}.")));
			}

			Ok(())
		})
	}
}
