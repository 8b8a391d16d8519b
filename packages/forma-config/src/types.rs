use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub registry: Registry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Every route is mounted below this prefix, e.g. "/api".
	#[serde(default = "default_url_prefix")]
	pub url_prefix: String,
	#[serde(default)]
	pub log_api_calls: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
	Memory,
	Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub backend: StorageBackend,
	pub postgres: Option<Postgres>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Search {
	pub default_limit: u32,
	/// Extra rows requested per scoped query so cross-field de-duplication does not starve the
	/// final result list.
	pub candidate_margin: u32,
}
impl Default for Search {
	fn default() -> Self {
		Self { default_limit: 10, candidate_margin: 60 }
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registry {
	pub manifest: Option<PathBuf>,
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_url_prefix() -> String {
	"/api".to_string()
}
