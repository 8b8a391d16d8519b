mod ranking;

pub use ranking::{DEFAULT_ADD_HITS, DEFAULT_WEIGHTING, ranking_key};

use std::sync::Arc;

use forma_domain::{FormattedResult, Localisation, RequestContext, Resource, SearchMode};
use serde_json::{Map, Value};
use tokio::task::JoinSet;

use crate::{
	Error, FormaService, Result,
	find::{self, FindParams},
};

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SearchRequest {
	/// Whitespace-separated search text. Each token matches as a case-insensitive prefix.
	pub q: Option<String>,
	/// JSON filter applied to every scoped query.
	pub f: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
	pub results: Vec<SearchEntry>,
	pub more_count: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEntry {
	pub id: Value,
	pub text: String,
	/// Ranking input only. Never serialized.
	#[serde(skip)]
	pub weighting: u32,
	pub search_importance: u32,
	pub add_hits: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resource: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resource_text: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl From<FormattedResult> for SearchEntry {
	fn from(formatted: FormattedResult) -> Self {
		Self {
			id: formatted.id,
			text: formatted.text,
			weighting: formatted.weighting.unwrap_or(DEFAULT_WEIGHTING),
			search_importance: forma_domain::SearchImportance::DEFAULT_RANK,
			add_hits: DEFAULT_ADD_HITS,
			resource: formatted.resource,
			resource_text: formatted.resource_text,
			extra: formatted.extra,
		}
	}
}

/// One (resource, field) query of a search.
struct ScopedSearch {
	resource: String,
	field: String,
	filter: Value,
}
impl ScopedSearch {
	fn params(&self, resource: &Resource, limit: usize) -> FindParams {
		FindParams {
			filter: Some(self.filter.clone()),
			sort: resource.options.search_order.clone(),
			limit: Some(limit),
			..Default::default()
		}
	}
}

impl FormaService {
	/// Searches one resource, or every registered resource when `resource` is `None`.
	pub async fn search(
		&self,
		ctx: &RequestContext,
		req: &SearchRequest,
		resource: Option<&str>,
	) -> Result<SearchResponse> {
		let targets: Vec<&Resource> = match resource {
			Some(name) => vec![self.resource(name)?],
			None => self.registry.resources().iter().collect(),
		};

		self.search_resources(ctx, req, &targets, self.search_cfg.default_limit as usize).await
	}

	pub async fn search_resources(
		&self,
		ctx: &RequestContext,
		req: &SearchRequest,
		targets: &[&Resource],
		limit: usize,
	) -> Result<SearchResponse> {
		let filter = parse_filter(req.f.as_deref())?;
		let criteria = search_criteria(req.q.as_deref().unwrap_or_default())?;
		let multi = targets.len() > 1;
		let candidate_limit = limit + self.search_cfg.candidate_margin as usize;
		let mut scoped = Vec::new();
		let mut results = Vec::new();

		for resource in targets.iter().filter(|resource| resource.search_importance().is_searchable()) {
			for field in resource.search_fields() {
				scoped.push(ScopedSearch {
					resource: resource.name.clone(),
					filter: scoped_filter(filter.as_ref(), &field, &criteria),
					field,
				});
			}
		}

		match self.registry.search_mode() {
			SearchMode::Sequential =>
				for item in &scoped {
					let resource = self.resource(&item.resource)?;

					tracing::debug!(resource = %item.resource, field = %item.field, "Running scoped search.");

					let docs = find::filtered_find(
						self.store.as_ref(),
						resource,
						ctx,
						item.params(resource, candidate_limit),
					)
					.await?;

					merge_docs(&mut results, resource, &docs, multi);
				},
			SearchMode::Concurrent => {
				let mut tasks = JoinSet::new();

				for item in scoped {
					let registry = Arc::clone(&self.registry);
					let store = Arc::clone(&self.store);
					let ctx = ctx.clone();

					tasks.spawn(async move {
						let resource = registry.get(&item.resource).ok_or_else(|| Error::NotFound {
							message: format!("No resource named {}.", item.resource),
						})?;

						tracing::debug!(resource = %item.resource, field = %item.field, "Running scoped search.");

						let docs = find::filtered_find(
							store.as_ref(),
							resource,
							&ctx,
							item.params(resource, candidate_limit),
						)
						.await?;

						Ok::<_, Error>((item.resource, docs))
					});
				}

				while let Some(joined) = tasks.join_next().await {
					let (name, docs) =
						joined.map_err(|err| Error::Internal { message: err.to_string() })??;
					let resource = self.resource(&name)?;

					merge_docs(&mut results, resource, &docs, multi);
				}
			},
		}

		let more_count = results.len().saturating_sub(limit);

		results.truncate(limit);

		Ok(SearchResponse { results, more_count })
	}
}

fn parse_filter(raw: Option<&str>) -> Result<Option<Map<String, Value>>> {
	let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
		return Ok(None);
	};

	match serde_json::from_str(raw) {
		Ok(Value::Object(filter)) => Ok(Some(filter)),
		Ok(_) => Err(Error::MalformedQuery { message: "The f parameter must be a JSON object.".to_string() }),
		Err(err) => Err(Error::MalformedQuery { message: format!("The f parameter is not valid JSON: {err}") }),
	}
}

/// Case-insensitive pattern matching any token as a prefix of the field value.
fn search_criteria(q: &str) -> Result<Value> {
	let tokens: Vec<String> = q.split_whitespace().map(regex::escape).collect();

	if tokens.is_empty() {
		return Err(Error::MalformedQuery { message: "Search text (q) is required.".to_string() });
	}

	let mut criteria = Map::new();

	criteria.insert("$regex".to_string(), Value::String(format!("^({})", tokens.join("|"))));
	criteria.insert("$options".to_string(), Value::String("i".to_string()));

	Ok(Value::Object(criteria))
}

/// The caller's filter plus the pattern on `field`. When the filter already constrains `field`,
/// both conditions go into `$and`.
fn scoped_filter(filter: Option<&Map<String, Value>>, field: &str, criteria: &Value) -> Value {
	let single = |condition: Value| {
		let mut obj = Map::new();

		obj.insert(field.to_string(), condition);

		Value::Object(obj)
	};
	let Some(filter) = filter else {
		return single(criteria.clone());
	};
	let mut doc = filter.clone();

	match doc.get(field).cloned() {
		Some(existing) => {
			let clauses = [single(existing), single(criteria.clone())];

			doc.retain(|key, _| key != field);

			match doc.get_mut("$and") {
				Some(Value::Array(items)) => items.extend(clauses),
				_ => {
					doc.insert("$and".to_string(), Value::Array(clauses.into()));
				},
			}
		},
		None => {
			doc.insert(field.to_string(), criteria.clone());
		},
	}

	Value::Object(doc)
}

fn merge_docs(results: &mut Vec<SearchEntry>, resource: &Resource, docs: &[Value], multi: bool) {
	for doc in docs {
		let id = doc.get("_id").cloned().unwrap_or(Value::Null);

		ranking::merge_hit(results, &id, || new_entry(resource, doc, multi));
	}
}

fn new_entry(resource: &Resource, doc: &Value, multi: bool) -> SearchEntry {
	let mut entry = match &resource.hooks.search_format {
		Some(formatter) => SearchEntry::from(formatter.format(doc)),
		None => SearchEntry {
			id: doc.get("_id").cloned().unwrap_or(Value::Null),
			text: resource.display_text(doc),
			weighting: DEFAULT_WEIGHTING,
			search_importance: forma_domain::SearchImportance::DEFAULT_RANK,
			add_hits: DEFAULT_ADD_HITS,
			resource: None,
			resource_text: None,
			extra: Map::new(),
		},
	};

	if multi && entry.resource.is_none() {
		entry.resource = Some(resource.name.clone());
		entry.resource_text = Some(resource.name.clone());
	}

	entry.search_importance = resource.search_importance().rank();

	let rules = &resource.options.localisation_data;

	if !rules.is_empty() {
		entry.resource = entry.resource.map(|text| localise(&text, rules, "resource"));
		entry.resource_text = entry.resource_text.map(|text| localise(&text, rules, "resourceText"));
	}

	entry
}

/// First rule whose `from` matches and whose context is unset or equal to `context`.
fn localise(text: &str, rules: &[Localisation], context: &str) -> String {
	rules
		.iter()
		.find(|rule| rule.from == text && rule.context.as_deref().is_none_or(|ctx| ctx == context))
		.map(|rule| rule.to.clone())
		.unwrap_or_else(|| text.to_string())
}
