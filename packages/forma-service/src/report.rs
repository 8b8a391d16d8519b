mod params;
mod translate;

use forma_domain::{ReportParams, ReportSchema, RequestContext, Resource};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{Error, FormaService, Result, find};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
	pub success: bool,
	pub schema: ReportSchema,
	pub report: Vec<Value>,
	pub params_used: ReportParams,
}

impl FormaService {
	/// Runs a named report, the ad-hoc report in the `r` query parameter, or the default report
	/// that projects every visible top-level field.
	pub async fn report(
		&self,
		ctx: &RequestContext,
		resource: &str,
		report: Option<&str>,
	) -> Result<ReportResponse> {
		let resource = self.resource(resource)?;
		let mut schema = resolve_schema(resource, report, ctx.query_param("r"))?;
		let base = find::run_find_hook(resource, ctx).await?;
		let mut params_used = schema.params.clone();

		params::assign_query_params(&mut params_used, &ctx.query)?;

		let mut pipeline = params::substitute(&schema.pipeline, &params_used)?;

		check_hidden_fields(resource, &pipeline)?;
		params::coerce_dates(&mut pipeline);

		if let Some(base) = base.filter(|base| base.as_object().is_none_or(|obj| !obj.is_empty())) {
			let mut stage = Map::new();

			stage.insert("$match".to_string(), base);
			pipeline.insert(0, Value::Object(stage));
		}

		let planned = match &schema.column_translations {
			Some(translations) => translate::plan(&self.registry, translations)?,
			None => Vec::new(),
		};
		let lookups = translate::spawn_lookups(&self.registry, &self.store, &planned);

		tracing::debug!(resource = %resource.name, stages = pipeline.len(), "Running report.");

		let mut rows = self.store.aggregate(&resource.collection, &pipeline).await?;
		let translations = translate::join_lookups(lookups, planned).await?;

		translate::apply(&mut rows, &translations)?;

		if schema.column_translations.is_some() {
			schema.column_translations =
				Some(translations.into_iter().map(|entry| entry.into_column()).collect());
		}

		Ok(ReportResponse { success: true, schema, report: rows, params_used })
	}
}

fn resolve_schema(resource: &Resource, name: Option<&str>, r: Option<&str>) -> Result<ReportSchema> {
	if let Some(name) = name {
		return resource.report(name).cloned().ok_or_else(|| Error::NotFound {
			message: format!("No report named {name} for {}.", resource.name),
		});
	}

	match r.filter(|raw| !raw.is_empty()) {
		Some(raw) if raw.starts_with('[') => Ok(ReportSchema::from_pipeline(parse_json(raw)?)),
		Some(raw) if raw.starts_with('{') => parse_json(raw),
		Some(_) =>
			Err(Error::InvalidReportSpec { message: "Invalid 'r' parameter".to_string() }),
		None => Ok(default_report(resource)),
	}
}

fn parse_json<T>(raw: &str) -> Result<T>
where
	T: DeserializeOwned,
{
	serde_json::from_str(raw)
		.map_err(|err| Error::MalformedQuery { message: format!("The r parameter is not valid: {err}") })
}

/// Projects every top-level field that is neither hidden nor holds hidden sub-fields.
fn default_report(resource: &Resource) -> ReportSchema {
	let hidden = resource.hidden_fields();
	let mut fields = Map::new();

	for field in &resource.schema.fields {
		let name = field.name.as_str();
		let conceals = hidden.iter().any(|hidden| {
			hidden == name || hidden.strip_prefix(name).is_some_and(|rest| rest.starts_with('.'))
		});

		if field.secure || name.contains('.') || conceals {
			continue;
		}

		fields.insert(name.to_string(), Value::from(1));
	}

	let mut stage = Map::new();

	stage.insert("$project".to_string(), Value::Object(fields));

	ReportSchema {
		drilldown: Some(format!("/#/{}/!_id!/edit", resource.name)),
		..ReportSchema::from_pipeline(vec![Value::Object(stage)])
	}
}

/// Rejects a pipeline whose JSON text mentions a hidden field anywhere, even inside an unrelated
/// string.
fn check_hidden_fields(resource: &Resource, pipeline: &[Value]) -> Result<()> {
	let text = serde_json::to_string(pipeline)
		.map_err(|err| Error::Internal { message: err.to_string() })?;

	if let Some(field) = resource.hidden_fields().iter().find(|field| text.contains(field.as_str())) {
		tracing::warn!(resource = %resource.name, field = %field, "Rejected report touching a hidden field.");

		return Err(Error::ForbiddenFieldAccess { field: field.clone() });
	}

	Ok(())
}
