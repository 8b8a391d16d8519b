use crate::{Error, Result, resource::Resource};

/// How the search engine schedules its per-field queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
	/// Every scoped query runs at once and results merge in completion order.
	#[default]
	Concurrent,
	/// Scoped queries run one after another in registry order.
	Sequential,
}

/// Registered resources. Written during startup and read-only afterwards.
#[derive(Debug, Default)]
pub struct Registry {
	resources: Vec<Resource>,
	mode: SearchMode,
}
impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a resource. The first resource with a search priority switches the registry to
	/// priority order for good: existing entries are stably sorted by rank and later entries are
	/// inserted after every entry of equal or lower rank.
	pub fn register(&mut self, resource: Resource) -> Result<()> {
		if self.get(&resource.name).is_some() {
			return Err(Error::Configuration {
				message: format!("Resource {} is already registered.", resource.name),
			});
		}

		if resource.search_importance().is_priority() && self.mode == SearchMode::Concurrent {
			self.mode = SearchMode::Sequential;

			self.resources.sort_by_key(|existing| existing.search_importance().rank());

			tracing::info!(resource = %resource.name, "Search switched to sequential priority order.");
		}

		let position = match self.mode {
			SearchMode::Concurrent => self.resources.len(),
			SearchMode::Sequential => {
				let rank = resource.search_importance().rank();

				self.resources.partition_point(|existing| existing.search_importance().rank() <= rank)
			},
		};

		tracing::info!(resource = %resource.name, position, "Registered resource.");

		self.resources.insert(position, resource);

		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<&Resource> {
		self.resources.iter().find(|resource| resource.name == name)
	}

	pub fn resources(&self) -> &[Resource] {
		&self.resources
	}

	pub fn search_mode(&self) -> SearchMode {
		self.mode
	}

	pub fn len(&self) -> usize {
		self.resources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.resources.is_empty()
	}
}
