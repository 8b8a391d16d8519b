use std::sync::Arc;

use serde_json::{Value, json};

use forma_domain::{
	FieldDef, FieldType, FindHook, HookError, Registry, RequestContext, Resource, ResourceHooks,
	ResourceOptions, ResourceSchema, manifest,
};
use forma_service::{Error, FormaService};
use forma_storage::{BoxFuture, MemoryStore};

fn garage() -> FormaService {
	let mut registry = Registry::new();
	let store = MemoryStore::new();
	let seeds = manifest::from_json_str(forma_testkit::GARAGE_MANIFEST)
		.expect("Manifest must parse.")
		.register_all(&mut registry)
		.expect("Registration must succeed.");

	for seed in seeds {
		store.seed(&seed.collection, seed.docs).expect("Seed must succeed.");
	}

	FormaService::new(forma_config::Search::default(), registry, Arc::new(store))
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

struct Unavailable;
impl FindHook for Unavailable {
	fn filter<'a>(
		&'a self,
		_ctx: &'a RequestContext,
	) -> BoxFuture<'a, Result<Option<Value>, HookError>> {
		Box::pin(async { Err(HookError("directory offline".to_string())) })
	}
}

fn people(hook: Arc<dyn FindHook>) -> FormaService {
	let people = Resource::new(
		"people",
		ResourceSchema::new(vec![
			FieldDef::new("name", FieldType::String).indexed(),
			FieldDef::new("town", FieldType::String),
		]),
		ResourceOptions::default(),
	)
	.expect("Resource must build.")
	.with_hooks(ResourceHooks { find: Some(hook), ..Default::default() });
	let mut registry = Registry::new();

	registry.register(people).expect("Register must work.");

	let store = MemoryStore::new();

	store
		.seed(
			"people",
			[
				json!({ "_id": "p1", "name": "Bea", "town": "Leeds" }),
				json!({ "_id": "p2", "name": "Ben", "town": "York" }),
				json!({ "_id": "p3", "name": "Cal", "town": "Leeds" }),
			],
		)
		.expect("Seed must succeed.");

	FormaService::new(forma_config::Search::default(), registry, Arc::new(store))
}

fn ctx(resource: &str, query: &[(&str, &str)]) -> RequestContext {
	let mut ctx = RequestContext::new(resource);

	ctx.query = query.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect();

	ctx
}

#[tokio::test]
async fn number_parameters_are_substituted_as_numbers() {
	let service = garage();
	let response = service
		.report(&ctx("cars", &[("minYear", "2001")]), "cars", Some("since"))
		.await
		.expect("Report must run.");

	assert!(response.success);
	assert_eq!(
		response.report,
		vec![
			json!({ "_id": "c2", "make": "Ford", "year": 2001 }),
			json!({ "_id": "c3", "make": "Audi", "year": 2021 }),
		]
	);
	assert_eq!(response.params_used["minYear"].value, json!("2001"));

	let defaults =
		service.report(&ctx("cars", &[]), "cars", Some("since")).await.expect("Report must run.");

	assert_eq!(defaults.report.len(), 2);
	assert_eq!(defaults.params_used["minYear"].value, json!(2000));
}

#[tokio::test]
async fn non_numeric_values_for_number_parameters_are_rejected() {
	let service = garage();
	let err = service
		.report(&ctx("cars", &[("minYear", "recent")]), "cars", Some("since"))
		.await
		.expect_err("Bad number must fail.");

	assert!(matches!(err, Error::InvalidParameterValue { ref name, .. } if name == "minYear"));
}

#[tokio::test]
async fn unknown_query_parameters_are_rejected() {
	let service = garage();
	let err = service
		.report(&ctx("cars", &[("colour", "red")]), "cars", Some("since"))
		.await
		.expect_err("Unknown parameter must fail.");

	assert!(matches!(err, Error::UnknownParameter { ref name } if name == "colour"));
}

#[tokio::test]
async fn ad_hoc_pipelines_coerce_timestamps_in_match_stages() {
	let service = garage();
	let r = r#"[{"$match":{"registered":{"$gte":"2000-01-01T00:00:00.000Z"}}},{"$project":{"make":1}},{"$sort":{"make":1}}]"#;
	let response = service
		.report(&ctx("cars", &[("r", r)]), "cars", None)
		.await
		.expect("Report must run.");

	assert_eq!(
		response.report,
		vec![json!({ "_id": "c3", "make": "Audi" }), json!({ "_id": "c2", "make": "Ford" })]
	);
}

#[tokio::test]
async fn any_mention_of_a_hidden_field_is_forbidden() {
	let service = garage();
	let r = r#"[{"$match":{"note":"forgot password"}}]"#;
	let err = service
		.report(&ctx("owners", &[("r", r)]), "owners", None)
		.await
		.expect_err("Hidden field mention must fail.");

	assert!(matches!(err, Error::ForbiddenFieldAccess { ref field } if field == "password"));
	assert_eq!(err.to_string(), "You cannot access password.");
}

#[tokio::test]
async fn referenced_columns_are_translated_to_display_text() {
	let service = garage();
	let response = service
		.report(&ctx("cars", &[]), "cars", Some("ownerCounts"))
		.await
		.expect("Report must run.");

	assert_eq!(
		response.report,
		vec![json!({ "_id": "Jones Jo", "cars": 2 }), json!({ "_id": "Smith Al", "cars": 1 })]
	);

	let columns = response.schema.column_translations.expect("Translations must be echoed.");

	assert_eq!(columns.len(), 1);
	assert_eq!(columns[0].translations.as_ref().map(Vec::len), Some(3));
}

#[tokio::test]
async fn rerunning_a_report_yields_identical_rows() {
	let service = garage();
	let first =
		service.report(&ctx("owners", &[]), "owners", Some("byTown")).await.expect("Report must run.");
	let second =
		service.report(&ctx("owners", &[]), "owners", Some("byTown")).await.expect("Report must run.");

	assert_eq!(first.report, vec![json!({ "_id": "Leeds", "count": 2 })]);
	assert_eq!(first.report, second.report);
}

#[tokio::test]
async fn the_default_report_lists_visible_fields_only() {
	let service = garage();
	let response =
		service.report(&ctx("owners", &[]), "owners", None).await.expect("Report must run.");

	assert_eq!(response.report.len(), 3);
	assert!(response.report.iter().all(|row| row.get("password").is_none()));
	assert_eq!(response.report[0].get("surname"), Some(&Value::String("Jones".to_string())));
}

#[tokio::test]
async fn unknown_named_reports_are_not_found() {
	let service = garage();
	let err = service
		.report(&ctx("cars", &[]), "cars", Some("missing"))
		.await
		.expect_err("Unknown report must fail.");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn placeholder_keys_are_substituted_with_parameter_text() {
	let service = garage();
	let r = r#"{"pipeline":[{"$project":{"(col)":1,"_id":0}},{"$sort":{"make":1}}],"params":{"col":{"value":"model"}}}"#;
	let response = service
		.report(&ctx("cars", &[("r", r), ("col", "make")]), "cars", None)
		.await
		.expect("Report must run.");

	assert_eq!(
		response.report,
		vec![json!({ "make": "Audi" }), json!({ "make": "Ford" }), json!({ "make": "Jowett" })]
	);

	let missing = r#"[{"$project":{"(col)":1}}]"#;
	let err = service
		.report(&ctx("cars", &[("r", missing)]), "cars", None)
		.await
		.expect_err("Unknown key parameter must fail.");

	assert!(matches!(err, Error::UnknownParameter { ref name } if name == "col"));
}

#[tokio::test]
async fn params_used_keep_their_declared_order() {
	let service = garage();
	let r = r#"{"pipeline":[{"$match":{"make":"(zMake)","model":"(aModel)"}}],"params":{"zMake":{"value":"Ford"},"aModel":{"value":"Ka"}}}"#;
	let response = service
		.report(&ctx("cars", &[("r", r)]), "cars", None)
		.await
		.expect("Report must run.");

	assert_eq!(response.report.len(), 1);
	assert_eq!(response.params_used.keys().collect::<Vec<_>>(), vec!["zMake", "aModel"]);

	let body = serde_json::to_value(&response).expect("Response must serialize.");
	let used: Vec<&String> =
		body["paramsUsed"].as_object().expect("Params must be an object.").keys().collect();

	assert_eq!(used, vec!["zMake", "aModel"]);
}

#[tokio::test]
async fn find_hook_filters_are_prepended_to_report_pipelines() {
	let service = people(Arc::new(LeedsOnly));
	let r = r#"[{"$group":{"_id":"$town","count":{"$sum":1}}}]"#;
	let response = service
		.report(&ctx("people", &[("r", r)]), "people", None)
		.await
		.expect("Report must run.");

	assert_eq!(response.report, vec![json!({ "_id": "Leeds", "count": 2 })]);

	let rows =
		service.report(&ctx("people", &[]), "people", None).await.expect("Report must run.");

	assert_eq!(rows.report.len(), 2);
	assert!(rows.report.iter().all(|row| row["town"] == json!("Leeds")));
}

#[tokio::test]
async fn failing_find_hooks_abort_the_report() {
	let service = people(Arc::new(Unavailable));
	let err = service
		.report(&ctx("people", &[]), "people", None)
		.await
		.expect_err("Hook failure must fail the report.");

	assert!(matches!(err, Error::Hook { ref message } if message.contains("directory offline")));
}
