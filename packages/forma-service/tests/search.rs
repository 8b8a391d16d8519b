use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use forma_domain::{
	FieldDef, FieldType, FindHook, FormattedResult, HookError, Localisation, Registry,
	RequestContext, Resource, ResourceHooks, ResourceOptions, ResourceSchema, SearchFormatter,
	SearchImportance, SearchMode, manifest,
};
use forma_service::{Error, FormaService, SearchRequest};
use forma_storage::{BoxFuture, DocumentStore, FindQuery, MemoryStore, Projection};

/// Records the order in which scoped finds start and finish.
struct SpyStore {
	inner: MemoryStore,
	events: Mutex<Vec<String>>,
}
impl SpyStore {
	fn events(&self) -> Vec<String> {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn record(&self, event: String) {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).push(event);
	}
}

impl DocumentStore for SpyStore {
	fn find<'a>(
		&'a self,
		collection: &'a str,
		query: &'a FindQuery,
	) -> BoxFuture<'a, forma_storage::Result<Vec<Value>>> {
		Box::pin(async move {
			let field = query
				.filter
				.as_object()
				.and_then(|filter| filter.keys().next().cloned())
				.unwrap_or_default();

			self.record(format!("start {collection}.{field}"));

			tokio::task::yield_now().await;

			let docs = self.inner.find(collection, query).await;

			self.record(format!("end {collection}.{field}"));

			docs
		})
	}

	fn find_one<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		projection: &'a Projection,
	) -> BoxFuture<'a, forma_storage::Result<Option<Value>>> {
		self.inner.find_one(collection, id, projection)
	}

	fn aggregate<'a>(
		&'a self,
		collection: &'a str,
		pipeline: &'a [Value],
	) -> BoxFuture<'a, forma_storage::Result<Vec<Value>>> {
		self.inner.aggregate(collection, pipeline)
	}

	fn insert<'a>(
		&'a self,
		collection: &'a str,
		doc: Value,
	) -> BoxFuture<'a, forma_storage::Result<Value>> {
		self.inner.insert(collection, doc)
	}

	fn replace<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
		doc: Value,
	) -> BoxFuture<'a, forma_storage::Result<Value>> {
		self.inner.replace(collection, id, doc)
	}

	fn remove<'a>(
		&'a self,
		collection: &'a str,
		id: &'a str,
	) -> BoxFuture<'a, forma_storage::Result<()>> {
		self.inner.remove(collection, id)
	}
}

fn garage() -> (Registry, MemoryStore) {
	let mut registry = Registry::new();
	let store = MemoryStore::new();
	let seeds = manifest::from_json_str(forma_testkit::GARAGE_MANIFEST)
		.expect("Manifest must parse.")
		.register_all(&mut registry)
		.expect("Registration must succeed.");

	for seed in seeds {
		store.seed(&seed.collection, seed.docs).expect("Seed must succeed.");
	}

	(registry, store)
}

fn search(q: &str) -> SearchRequest {
	SearchRequest { q: Some(q.to_string()), f: None }
}

fn ids(results: &[forma_service::SearchEntry]) -> Vec<String> {
	results.iter().map(|entry| entry.id.as_str().unwrap_or_default().to_string()).collect()
}

#[tokio::test]
async fn prioritised_resources_are_searched_sequentially_in_priority_order() {
	let (registry, memory) = garage();
	let spy = Arc::new(SpyStore { inner: memory, events: Mutex::new(Vec::new()) });
	let service = FormaService::new(forma_config::Search::default(), registry, spy.clone());

	assert_eq!(service.registry.search_mode(), SearchMode::Sequential);

	let response = service
		.search(&RequestContext::default(), &search("Jo"), None)
		.await
		.expect("Search must succeed.");

	assert_eq!(
		spy.events(),
		vec![
			"start cars.make",
			"end cars.make",
			"start cars.model",
			"end cars.model",
			"start owners.surname",
			"end owners.surname",
			"start owners.forename",
			"end owners.forename",
		]
	);
	assert_eq!(ids(&response.results), vec!["o1", "c3", "c1", "o3"]);
	assert_eq!(response.more_count, 0);

	let first = serde_json::to_value(&response.results[0]).expect("Entry must serialize.");

	assert_eq!(
		first,
		json!({
			"id": "o1",
			"text": "Jones Jo",
			"searchImportance": 2,
			"addHits": 8,
			"resource": "owners",
			"resourceText": "owners"
		})
	);
}

#[tokio::test]
async fn results_are_capped_and_the_overflow_counted() {
	let (registry, memory) = garage();
	let service = FormaService::new(forma_config::Search::default(), registry, Arc::new(memory));
	let targets: Vec<&Resource> = service.registry.resources().iter().collect();
	let response = service
		.search_resources(&RequestContext::default(), &search("Jo"), &targets, 2)
		.await
		.expect("Search must succeed.");

	assert_eq!(ids(&response.results), vec!["o1", "c3"]);
	assert_eq!(response.more_count, 2);
}

#[tokio::test]
async fn single_resource_search_omits_the_resource_name() {
	let (registry, memory) = garage();
	let service = FormaService::new(forma_config::Search::default(), registry, Arc::new(memory));
	let response = service
		.search(&RequestContext::default(), &search("jo"), Some("owners"))
		.await
		.expect("Search must succeed.");

	assert_eq!(ids(&response.results), vec!["o1", "o3"]);
	assert!(response.results.iter().all(|entry| entry.resource.is_none()));
}

#[tokio::test]
async fn filters_combine_with_the_search_pattern() {
	let (registry, memory) = garage();
	let service = FormaService::new(forma_config::Search::default(), registry, Arc::new(memory));
	let req = SearchRequest {
		q: Some("Jo".to_string()),
		f: Some(r#"{"forename": {"$ne": "Jo"}}"#.to_string()),
	};
	let response = service
		.search(&RequestContext::default(), &req, Some("owners"))
		.await
		.expect("Search must succeed.");

	assert_eq!(ids(&response.results), vec!["o3"]);
	assert_eq!(response.results[0].add_hits, 9);
}

#[tokio::test]
async fn malformed_filters_fail_before_any_query_runs() {
	let (registry, memory) = garage();
	let spy = Arc::new(SpyStore { inner: memory, events: Mutex::new(Vec::new()) });
	let service = FormaService::new(forma_config::Search::default(), registry, spy.clone());
	let req = SearchRequest { q: Some("Jo".to_string()), f: Some("{town".to_string()) };
	let err = service
		.search(&RequestContext::default(), &req, None)
		.await
		.expect_err("Malformed filter must fail.");

	assert!(matches!(err, Error::MalformedQuery { .. }));
	assert!(spy.events().is_empty());
}

struct LeedsOnly;
impl FindHook for LeedsOnly {
	fn filter<'a>(
		&'a self,
		_ctx: &'a RequestContext,
	) -> BoxFuture<'a, Result<Option<Value>, HookError>> {
		Box::pin(async { Ok(Some(json!({ "town": "Leeds" }))) })
	}
}

struct Badge;
impl SearchFormatter for Badge {
	fn format(&self, doc: &Value) -> FormattedResult {
		let mut formatted = FormattedResult::new(
			doc.get("_id").cloned().unwrap_or(Value::Null),
			format!("#{}", doc.get("name").and_then(Value::as_str).unwrap_or_default()),
		);

		formatted.weighting = Some(1);

		formatted
	}
}

fn people_and_pets() -> FormaService {
	let people = Resource::new(
		"people",
		ResourceSchema::new(vec![
			FieldDef::new("name", FieldType::String).indexed(),
			FieldDef::new("town", FieldType::String),
		]),
		ResourceOptions {
			localisation_data: vec![Localisation {
				from: "people".to_string(),
				to: "Personen".to_string(),
				context: None,
			}],
			..Default::default()
		},
	)
	.expect("Resource must build.")
	.with_hooks(ResourceHooks { find: Some(Arc::new(LeedsOnly)), ..Default::default() });
	let pets = Resource::new(
		"pets",
		ResourceSchema::new(vec![FieldDef::new("name", FieldType::String).indexed()]),
		ResourceOptions::default(),
	)
	.expect("Resource must build.")
	.with_hooks(ResourceHooks { search_format: Some(Arc::new(Badge)), ..Default::default() });
	let hidden = Resource::new(
		"ledger",
		ResourceSchema::new(vec![FieldDef::new("name", FieldType::String).indexed()]),
		ResourceOptions { search_importance: SearchImportance::Disabled, ..Default::default() },
	)
	.expect("Resource must build.");
	let mut registry = Registry::new();

	registry.register(people).expect("Register must work.");
	registry.register(pets).expect("Register must work.");
	registry.register(hidden).expect("Register must work.");

	let store = MemoryStore::new();

	store
		.seed(
			"people",
			[
				json!({ "_id": "p1", "name": "Bea", "town": "Leeds" }),
				json!({ "_id": "p2", "name": "Ben", "town": "York" }),
			],
		)
		.expect("Seed must succeed.");
	store.seed("pets", [json!({ "_id": "x1", "name": "Benji" })]).expect("Seed must succeed.");
	store.seed("ledger", [json!({ "_id": "l1", "name": "Bank" })]).expect("Seed must succeed.");

	FormaService::new(forma_config::Search::default(), registry, Arc::new(store))
}

#[tokio::test]
async fn concurrent_search_applies_hooks_formatters_and_localisation() {
	let service = people_and_pets();

	assert_eq!(service.registry.search_mode(), SearchMode::Concurrent);

	let response = service
		.search(&RequestContext::default(), &search("b"), None)
		.await
		.expect("Search must succeed.");

	assert_eq!(ids(&response.results), vec!["x1", "p1"]);
	assert_eq!(response.results[0].text, "#Benji");
	assert_eq!(response.results[0].resource.as_deref(), Some("pets"));
	assert_eq!(response.results[1].resource.as_deref(), Some("Personen"));
	assert_eq!(response.results[1].resource_text.as_deref(), Some("Personen"));
}

#[tokio::test]
async fn formatter_entries_are_labelled_only_in_multi_resource_searches() {
	let service = people_and_pets();
	let multi = service
		.search(&RequestContext::default(), &search("benji"), None)
		.await
		.expect("Search must succeed.");

	assert_eq!(ids(&multi.results), vec!["x1"]);
	assert_eq!(multi.results[0].text, "#Benji");
	assert_eq!(multi.results[0].resource.as_deref(), Some("pets"));
	assert_eq!(multi.results[0].resource_text.as_deref(), Some("pets"));

	let single = service
		.search(&RequestContext::default(), &search("benji"), Some("pets"))
		.await
		.expect("Search must succeed.");

	assert_eq!(ids(&single.results), vec!["x1"]);
	assert_eq!(single.results[0].text, "#Benji");
	assert!(single.results[0].resource.is_none());
	assert!(single.results[0].resource_text.is_none());
}
