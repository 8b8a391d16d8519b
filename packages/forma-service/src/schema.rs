use forma_domain::Paths;

use crate::{Error, FormaService, Result};

impl FormaService {
	/// Descriptor paths for a resource, narrowed to a named form when one is given.
	pub fn schema(&self, resource: &str, form: Option<&str>) -> Result<Paths> {
		let resource = self.resource(resource)?;

		resource.form_paths(form)?.ok_or_else(|| Error::NotFound {
			message: format!("No form named {} for {}.", form.unwrap_or_default(), resource.name),
		})
	}
}
