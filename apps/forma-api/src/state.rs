use std::sync::Arc;

use color_eyre::eyre;
use forma_config::{Config, StorageBackend};
use forma_domain::{
	Registry,
	manifest::{self, SeedBatch},
};
use forma_service::FormaService;
use forma_storage::{DocumentStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<FormaService>,
	/// Normalized route prefix. Empty mounts every route at the root.
	pub url_prefix: String,
	pub log_api_calls: bool,
}
impl AppState {
	/// Registers the configured manifest and opens the configured store.
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let mut registry = Registry::new();
		let seeds = match &config.registry.manifest {
			Some(path) => manifest::load(path)?.register_all(&mut registry)?,
			None => Vec::new(),
		};

		Self::with_registry(config, registry, seeds).await
	}

	/// Builds state around resources the caller registered. Seed batches only land in empty
	/// in-memory collections.
	pub async fn with_registry(
		config: Config,
		registry: Registry,
		seeds: Vec<SeedBatch>,
	) -> color_eyre::Result<Self> {
		let store: Arc<dyn DocumentStore> = match config.storage.backend {
			StorageBackend::Memory => {
				let store = MemoryStore::new();

				for seed in seeds {
					if !store.is_empty(&seed.collection) {
						continue;
					}

					let count = store.seed(&seed.collection, seed.docs)?;

					tracing::info!(collection = %seed.collection, count, "Seeded collection.");
				}

				Arc::new(store)
			},
			StorageBackend::Postgres => {
				let Some(postgres) = config.storage.postgres.as_ref() else {
					return Err(eyre::eyre!(
						"storage.postgres is required when storage.backend is postgres."
					));
				};
				let store = PgStore::connect(postgres).await?;

				store.ensure_schema().await?;

				if !seeds.is_empty() {
					tracing::warn!("Manifest seed documents are ignored by the postgres backend.");
				}

				Arc::new(store)
			},
		};
		let service = FormaService::new(config.search.clone(), registry, store);

		Ok(Self {
			service: Arc::new(service),
			url_prefix: config.service.url_prefix,
			log_api_calls: config.service.log_api_calls,
		})
	}
}
