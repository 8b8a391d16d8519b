//! JSON resource manifests.
//!
//! ```json
//! {"resources": [{"name": "cars", "schema": {"fields": [...]}, "options": {...}, "seed": [...]}]}
//! ```

use std::{fs, path::Path};

use serde_json::Value;

use crate::{
	Error, Result,
	registry::Registry,
	resource::{Resource, ResourceOptions},
	schema::ResourceSchema,
};

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Manifest {
	#[serde(default)]
	pub resources: Vec<ManifestResource>,
}
impl Manifest {
	/// Registers every resource in manifest order and returns the seed documents to load.
	pub fn register_all(self, registry: &mut Registry) -> Result<Vec<SeedBatch>> {
		let mut seeds = Vec::new();

		for entry in self.resources {
			let mut resource = Resource::new(entry.name, entry.schema, entry.options)?;

			if let Some(collection) = entry.collection {
				resource = resource.with_collection(collection);
			}
			if !entry.seed.is_empty() {
				seeds.push(SeedBatch { collection: resource.collection.clone(), docs: entry.seed });
			}

			registry.register(resource)?;
		}

		Ok(seeds)
	}
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ManifestResource {
	pub name: String,
	#[serde(default)]
	pub collection: Option<String>,
	#[serde(default)]
	pub schema: ResourceSchema,
	#[serde(default)]
	pub options: ResourceOptions,
	#[serde(default)]
	pub seed: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedBatch {
	pub collection: String,
	pub docs: Vec<Value>,
}

pub fn load(path: &Path) -> Result<Manifest> {
	let raw = fs::read_to_string(path).map_err(|err| Error::Manifest {
		path: path.display().to_string(),
		message: err.to_string(),
	})?;

	parse(&raw, &path.display().to_string())
}

pub fn from_json_str(raw: &str) -> Result<Manifest> {
	parse(raw, "<inline>")
}

fn parse(raw: &str, origin: &str) -> Result<Manifest> {
	serde_json::from_str(raw)
		.map_err(|err| Error::Manifest { path: origin.to_string(), message: err.to_string() })
}
