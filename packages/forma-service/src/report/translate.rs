use std::sync::Arc;

use forma_domain::{ColumnTranslation, Registry, TranslationRule};
use forma_storage::{DocumentStore, FindQuery, Projection, value};
use serde_json::Value;
use tokio::task::JoinSet;

use crate::{Error, Result};

/// A validated column translation. Lookup translations get their rules once their lookup task
/// completes.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct PlannedTranslation {
	pub(super) field: String,
	pub(super) reference: Option<String>,
	pub(super) rules: Vec<TranslationRule>,
}
impl PlannedTranslation {
	pub(super) fn into_column(self) -> ColumnTranslation {
		ColumnTranslation {
			field: Some(self.field),
			reference: self.reference,
			translations: Some(self.rules),
		}
	}
}

type LookupTasks = JoinSet<Result<(usize, Vec<TranslationRule>)>>;

/// Checks every translation before anything runs.
pub(super) fn plan(
	registry: &Registry,
	translations: &[ColumnTranslation],
) -> Result<Vec<PlannedTranslation>> {
	let mut planned: Vec<PlannedTranslation> = Vec::with_capacity(translations.len());

	for translation in translations {
		let Some(field) = translation.field.as_deref().filter(|field| !field.is_empty()) else {
			return Err(Error::MissingTranslationRule { field: String::new() });
		};

		if let Some(reference) = &translation.reference {
			if registry.get(reference).is_none() {
				return Err(Error::InvalidReference {
					reference: reference.clone(),
					field: field.to_string(),
				});
			}
			if planned.iter().any(|entry| entry.reference.is_some() && entry.field == field) {
				return Err(Error::DuplicateTranslation { field: field.to_string() });
			}

			planned.push(PlannedTranslation {
				field: field.to_string(),
				reference: Some(reference.clone()),
				rules: Vec::new(),
			});
		} else if let Some(rules) = &translation.translations {
			planned.push(PlannedTranslation {
				field: field.to_string(),
				reference: None,
				rules: rules.clone(),
			});
		} else {
			return Err(Error::MissingTranslationRule { field: field.to_string() });
		}
	}

	Ok(planned)
}

/// Starts one task per lookup translation. Each loads the referenced collection and maps record
/// ids to display text.
pub(super) fn spawn_lookups(
	registry: &Arc<Registry>,
	store: &Arc<dyn DocumentStore>,
	planned: &[PlannedTranslation],
) -> LookupTasks {
	let mut tasks = JoinSet::new();

	for (index, entry) in planned.iter().enumerate() {
		let Some(reference) = entry.reference.clone() else {
			continue;
		};
		let field = entry.field.clone();
		let registry = Arc::clone(registry);
		let store = Arc::clone(store);

		tasks.spawn(async move {
			let lookup = registry
				.get(&reference)
				.ok_or_else(|| Error::InvalidReference { reference: reference.clone(), field })?;
			let query = FindQuery {
				projection: Projection::exclude(lookup.hidden_fields().iter().cloned()),
				..Default::default()
			};
			let docs = store.find(&lookup.collection, &query).await?;
			let rules = docs
				.iter()
				.map(|doc| TranslationRule {
					value: doc.get("_id").cloned().unwrap_or(Value::Null),
					display: Value::String(lookup.display_text(doc)),
				})
				.collect();

			Ok((index, rules))
		});
	}

	tasks
}

/// Waits for every lookup and fills in its rules.
pub(super) async fn join_lookups(
	mut tasks: LookupTasks,
	mut planned: Vec<PlannedTranslation>,
) -> Result<Vec<PlannedTranslation>> {
	while let Some(joined) = tasks.join_next().await {
		let (index, rules) = joined.map_err(|err| Error::Internal { message: err.to_string() })??;

		if let Some(entry) = planned.get_mut(index) {
			entry.rules = rules;
		}
	}

	Ok(planned)
}

/// Rewrites each translated column from raw value to label. Values are compared in string form.
pub(super) fn apply(rows: &mut [Value], translations: &[PlannedTranslation]) -> Result<()> {
	for translation in translations {
		for row in rows.iter_mut() {
			let raw = match value::lookup_path(row, &translation.field) {
				None | Some(Value::Null) =>
					return Err(Error::UntranslatableValue {
						field: translation.field.clone(),
						value: "null".to_string(),
					}),
				Some(raw) => value::display_string(raw),
			};
			let Some(rule) =
				translation.rules.iter().find(|rule| value::display_string(&rule.value) == raw)
			else {
				return Err(Error::UntranslatableValue { field: translation.field.clone(), value: raw });
			};

			value::set_path(row, &translation.field, rule.display.clone());
		}
	}

	Ok(())
}
