//! Composes the optional aggregation id filter, the find hook, a free-form filter, hidden-field
//! projection and paging into one store query.

use forma_domain::{RequestContext, Resource};
use forma_storage::{DocumentStore, FindQuery, Projection, SortSpec};
use serde_json::{Map, Value};

use crate::{Error, FormaService, Result};

#[derive(Debug, Clone, Default)]
pub struct FindParams {
	/// Pipeline whose result `_id`s restrict the find. No results means no records.
	pub aggregation: Option<Vec<Value>>,
	pub filter: Option<Value>,
	pub sort: Option<Value>,
	pub limit: Option<usize>,
	pub skip: Option<usize>,
}

impl FormaService {
	pub async fn filtered_find(
		&self,
		resource: &Resource,
		ctx: &RequestContext,
		params: FindParams,
	) -> Result<Vec<Value>> {
		filtered_find(self.store.as_ref(), resource, ctx, params).await
	}
}

pub async fn filtered_find(
	store: &dyn DocumentStore,
	resource: &Resource,
	ctx: &RequestContext,
	params: FindParams,
) -> Result<Vec<Value>> {
	let id_in = match &params.aggregation {
		Some(pipeline) => {
			let ids: Vec<Value> = store
				.aggregate(&resource.collection, pipeline)
				.await?
				.into_iter()
				.filter_map(|row| row.get("_id").cloned())
				.collect();

			if ids.is_empty() {
				return Ok(Vec::new());
			}

			Some(ids)
		},
		None => None,
	};
	let base = run_find_hook(resource, ctx).await?;
	let sort = params.sort.as_ref().filter(|sort| !sort.is_null()).map(SortSpec::parse).transpose()?;
	let query = FindQuery {
		filter: combine_filters([base, params.filter]),
		id_in,
		projection: Projection::exclude(resource.hidden_fields().iter().cloned()),
		sort,
		limit: params.limit,
		skip: params.skip,
	};

	tracing::debug!(resource = %resource.name, filter = %query.filter, limit = ?query.limit, "Running filtered find.");

	Ok(store.find(&resource.collection, &query).await?)
}

/// The resource's per-request base filter, if it declares a find hook.
pub async fn run_find_hook(resource: &Resource, ctx: &RequestContext) -> Result<Option<Value>> {
	let Some(hook) = &resource.hooks.find else {
		return Ok(None);
	};

	hook.filter(ctx).await.map_err(|err| {
		tracing::warn!(resource = %resource.name, error = %err, "Find hook failed.");

		Error::Hook {
			message: format!("There was a problem with the find hook for {}: {err}", resource.name),
		}
	})
}

/// Conjunction of the non-empty filters. Two or more filters are combined under `$and` so no
/// condition overwrites another.
pub fn combine_filters<I>(filters: I) -> Value
where
	I: IntoIterator<Item = Option<Value>>,
{
	let mut clauses: Vec<Value> = filters
		.into_iter()
		.flatten()
		.filter(|filter| match filter {
			Value::Null => false,
			Value::Object(obj) => !obj.is_empty(),
			_ => true,
		})
		.collect();

	match clauses.len() {
		0 => Value::Null,
		1 => clauses.pop().unwrap_or(Value::Null),
		_ => {
			let mut and = Map::new();

			and.insert("$and".to_string(), Value::Array(clauses));

			Value::Object(and)
		},
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn combine_filters_skips_empty_filters_and_ands_the_rest() {
		assert_eq!(combine_filters([None, Some(json!({}))]), Value::Null);
		assert_eq!(combine_filters([Some(json!({ "a": 1 })), None]), json!({ "a": 1 }));
		assert_eq!(
			combine_filters([Some(json!({ "a": 1 })), Some(json!({ "a": 2 }))]),
			json!({ "$and": [{ "a": 1 }, { "a": 2 }] })
		);
	}
}
