pub mod display;
pub mod field;
pub mod hooks;
pub mod manifest;
pub mod preprocess;
pub mod registry;
pub mod report;
pub mod resource;
pub mod schema;

mod error;

pub use error::Error;
pub use field::{FieldDef, FieldType};
pub use hooks::{
	FindHook, FormattedResult, HookError, RequestContext, ResourceHooks, SaveHook,
	SearchFormatter,
};
pub use preprocess::{PathDescriptor, Paths, SchemaDescriptor, preprocess};
pub use registry::{Registry, SearchMode};
pub use report::{ColumnTranslation, ReportParam, ReportParams, ReportSchema, TranslationRule};
pub use resource::{ListField, Localisation, Resource, ResourceOptions, SearchImportance};
pub use schema::{FormOverride, IndexDef, ResourceSchema};

pub type Result<T, E = Error> = std::result::Result<T, E>;
