use std::collections::BTreeMap;

use axum::{
	Json, Router,
	body::Body,
	extract::{Path, Query, State},
	http::{HeaderMap, Request, StatusCode, Uri, header},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::get,
};
use serde_json::Value;

use forma_domain::{Paths, RequestContext};
use forma_service::{
	DeleteResponse, EntityListResponse, Error, ListQuery, ModelSummary, ReportResponse,
	SearchRequest, SearchResponse,
};

use crate::state::AppState;

type QueryPairs = Query<Vec<(String, String)>>;

pub fn router(state: AppState) -> Router {
	let api = Router::new()
		.route("/health", get(health))
		.route("/models", get(models))
		.route("/search", get(search_all))
		.route("/search/{resource}", get(search_resource))
		.route("/schema/{resource}", get(schema))
		.route("/schema/{resource}/{form}", get(schema_form))
		.route("/report/{resource}", get(report))
		.route("/report/{resource}/{report}", get(named_report))
		.route("/{resource}", get(list_records).post(create_record))
		.route(
			"/{resource}/{id}",
			get(get_record).post(update_record).put(update_record).delete(delete_record),
		)
		.route("/{resource}/{id}/list", get(entity_list));
	let app = if state.url_prefix.is_empty() {
		api
	} else {
		Router::new().nest(&state.url_prefix, api)
	};
	let app = app.fallback(not_found);
	let app = if state.log_api_calls { app.layer(middleware::from_fn(log_api_call)) } else { app };

	app.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn models(State(state): State<AppState>) -> Json<Vec<ModelSummary>> {
	Json(state.service.models())
}

async fn search_all(
	State(state): State<AppState>,
	Query(query): QueryPairs,
	headers: HeaderMap,
) -> Result<Json<SearchResponse>, ApiError> {
	let ctx = request_context("", query, &headers);
	let response = state.service.search(&ctx, &search_request(&ctx), None).await?;

	Ok(Json(response))
}

async fn search_resource(
	State(state): State<AppState>,
	Path(resource): Path<String>,
	Query(query): QueryPairs,
	headers: HeaderMap,
) -> Result<Json<SearchResponse>, ApiError> {
	let ctx = request_context(&resource, query, &headers);
	let response = state.service.search(&ctx, &search_request(&ctx), Some(&resource)).await?;

	Ok(Json(response))
}

async fn schema(
	State(state): State<AppState>,
	Path(resource): Path<String>,
) -> Result<Json<Paths>, ApiError> {
	Ok(Json(state.service.schema(&resource, None)?))
}

async fn schema_form(
	State(state): State<AppState>,
	Path((resource, form)): Path<(String, String)>,
) -> Result<Json<Paths>, ApiError> {
	Ok(Json(state.service.schema(&resource, Some(&form))?))
}

async fn report(
	State(state): State<AppState>,
	Path(resource): Path<String>,
	Query(query): QueryPairs,
	headers: HeaderMap,
) -> Result<Json<ReportResponse>, ApiError> {
	let ctx = request_context(&resource, query, &headers);
	let response = state.service.report(&ctx, &resource, None).await?;

	Ok(Json(response))
}

async fn named_report(
	State(state): State<AppState>,
	Path((resource, report)): Path<(String, String)>,
	Query(query): QueryPairs,
	headers: HeaderMap,
) -> Result<Json<ReportResponse>, ApiError> {
	let ctx = request_context(&resource, query, &headers);
	let response = state.service.report(&ctx, &resource, Some(&report)).await?;

	Ok(Json(response))
}

async fn list_records(
	State(state): State<AppState>,
	Path(resource): Path<String>,
	Query(query): QueryPairs,
	headers: HeaderMap,
) -> Result<Json<Vec<Value>>, ApiError> {
	let ctx = request_context(&resource, query, &headers);
	let param = |name: &str| ctx.query_param(name).map(str::to_string);
	let list_query =
		ListQuery { a: param("a"), f: param("f"), l: param("l"), s: param("s"), o: param("o") };
	let response = state.service.list_records(&ctx, &resource, &list_query).await?;

	Ok(Json(response))
}

async fn create_record(
	State(state): State<AppState>,
	Path(resource): Path<String>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let ctx = request_context(&resource, Vec::new(), &headers);
	let response = state.service.create_record(&ctx, &resource, body).await?;

	Ok(Json(response))
}

async fn get_record(
	State(state): State<AppState>,
	Path((resource, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
	Ok(Json(state.service.get_record(&resource, &id).await?))
}

async fn update_record(
	State(state): State<AppState>,
	Path((resource, id)): Path<(String, String)>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
	let ctx = request_context(&resource, Vec::new(), &headers);
	let response = state.service.update_record(&ctx, &resource, &id, body).await?;

	Ok(Json(response))
}

async fn delete_record(
	State(state): State<AppState>,
	Path((resource, id)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>, ApiError> {
	Ok(Json(state.service.delete_record(&resource, &id).await?))
}

async fn entity_list(
	State(state): State<AppState>,
	Path((resource, id)): Path<(String, String)>,
) -> Result<Json<EntityListResponse>, ApiError> {
	Ok(Json(state.service.entity_list(&resource, &id).await?))
}

async fn not_found(uri: Uri) -> ApiError {
	json_error(StatusCode::NOT_FOUND, "NOT_FOUND", format!("No route for {}.", uri.path()), None)
}

async fn log_api_call(req: Request<Body>, next: Next) -> Response {
	let body_len = req
		.headers()
		.get(header::CONTENT_LENGTH)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.parse::<u64>().ok())
		.unwrap_or(0);

	tracing::info!(method = %req.method(), uri = %req.uri(), body_len, "API call.");

	next.run(req).await
}

fn request_context(
	resource: &str,
	query: Vec<(String, String)>,
	headers: &HeaderMap,
) -> RequestContext {
	let headers: BTreeMap<String, String> = headers
		.iter()
		.filter_map(|(name, value)| {
			value.to_str().ok().map(|value| (name.as_str().to_string(), value.to_string()))
		})
		.collect();

	RequestContext { resource: resource.to_string(), query, headers }
}

fn search_request(ctx: &RequestContext) -> SearchRequest {
	SearchRequest {
		q: ctx.query_param("q").map(str::to_string),
		f: ctx.query_param("f").map(str::to_string),
	}
}

#[derive(Debug, serde::Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		let status = match &err {
			Error::ForbiddenFieldAccess { .. } => StatusCode::FORBIDDEN,
			Error::NotFound { .. } => StatusCode::NOT_FOUND,
			Error::Conflict { .. } => StatusCode::CONFLICT,
			Error::Configuration { .. } | Error::Storage { .. } | Error::Internal { .. } => {
				tracing::error!(error = %err, "Request failed.");

				StatusCode::INTERNAL_SERVER_ERROR
			},
			_ => StatusCode::BAD_REQUEST,
		};

		json_error(status, err.code(), err.to_string(), err.fields())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
