pub mod find;
pub mod records;
pub mod report;
pub mod schema;
pub mod search;

mod error;

pub use error::{Error, Result};
pub use find::FindParams;
pub use records::{DeleteResponse, EntityListResponse, ListQuery};
pub use report::ReportResponse;
pub use search::{SearchEntry, SearchRequest, SearchResponse};

use std::sync::Arc;

use forma_domain::{Registry, Resource, ResourceOptions};
use forma_storage::DocumentStore;

pub struct FormaService {
	pub search_cfg: forma_config::Search,
	pub registry: Arc<Registry>,
	pub store: Arc<dyn DocumentStore>,
}
impl FormaService {
	pub fn new(
		search_cfg: forma_config::Search,
		registry: Registry,
		store: Arc<dyn DocumentStore>,
	) -> Self {
		Self { search_cfg, registry: Arc::new(registry), store }
	}

	pub fn resource(&self, name: &str) -> Result<&Resource> {
		self.registry
			.get(name)
			.ok_or_else(|| Error::NotFound { message: format!("No resource named {name}.") })
	}

	/// Every registered resource in registry order.
	pub fn models(&self) -> Vec<ModelSummary> {
		self.registry
			.resources()
			.iter()
			.map(|resource| ModelSummary {
				resource_name: resource.name.clone(),
				collection: resource.collection.clone(),
				options: resource.options.clone(),
			})
			.collect()
	}
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSummary {
	pub resource_name: String,
	pub collection: String,
	pub options: ResourceOptions,
}
