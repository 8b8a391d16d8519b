pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Malformed query: {message}")]
	MalformedQuery { message: String },
	#[error("{message}")]
	InvalidReportSpec { message: String },
	#[error("No parameter slot named {name}.")]
	UnknownParameter { name: String },
	#[error("Invalid value for parameter {name}: {message}")]
	InvalidParameterValue { name: String, message: String },
	#[error("You cannot access {field}.")]
	ForbiddenFieldAccess { field: String },
	#[error("Invalid ref property of {reference} in columnTranslations {field}.")]
	InvalidReference { reference: String, field: String },
	#[error("A column translation needs a field and a ref or translations property ({field:?}).")]
	MissingTranslationRule { field: String },
	#[error("Cannot have two columnTranslations for field {field}.")]
	DuplicateTranslation { field: String },
	#[error("No translation of {value} for column {field}.")]
	UntranslatableValue { field: String, value: String },
	#[error("Invalid {field}: {message}")]
	Validation { field: String, message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Hook failed: {message}")]
	Hook { message: String },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Internal error: {message}")]
	Internal { message: String },
}
impl Error {
	/// Stable machine-readable code for API responses.
	pub fn code(&self) -> &'static str {
		match self {
			Self::MalformedQuery { .. } => "MALFORMED_QUERY",
			Self::InvalidReportSpec { .. } => "INVALID_REPORT_SPEC",
			Self::UnknownParameter { .. } => "UNKNOWN_PARAMETER",
			Self::InvalidParameterValue { .. } => "INVALID_PARAMETER_VALUE",
			Self::ForbiddenFieldAccess { .. } => "FORBIDDEN_FIELD_ACCESS",
			Self::InvalidReference { .. } => "INVALID_REFERENCE",
			Self::MissingTranslationRule { .. } => "MISSING_TRANSLATION_RULE",
			Self::DuplicateTranslation { .. } => "DUPLICATE_TRANSLATION",
			Self::UntranslatableValue { .. } => "UNTRANSLATABLE_VALUE",
			Self::Validation { .. } => "VALIDATION_FAILED",
			Self::NotFound { .. } => "NOT_FOUND",
			Self::Conflict { .. } => "CONFLICT",
			Self::Hook { .. } => "HOOK_FAILED",
			Self::Configuration { .. } => "CONFIGURATION_ERROR",
			Self::Storage { .. } => "STORAGE_ERROR",
			Self::Internal { .. } => "INTERNAL_ERROR",
		}
	}

	/// Identifiers the caller can act on, such as the offending field or parameter.
	pub fn fields(&self) -> Option<Vec<String>> {
		match self {
			Self::UnknownParameter { name } | Self::InvalidParameterValue { name, .. } =>
				Some(vec![name.clone()]),
			Self::ForbiddenFieldAccess { field }
			| Self::MissingTranslationRule { field }
			| Self::DuplicateTranslation { field }
			| Self::UntranslatableValue { field, .. }
			| Self::Validation { field, .. } => Some(vec![field.clone()]),
			Self::InvalidReference { reference, field } => Some(vec![field.clone(), reference.clone()]),
			_ => None,
		}
	}
}

impl From<forma_storage::Error> for Error {
	fn from(err: forma_storage::Error) -> Self {
		match err {
			forma_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			forma_storage::Error::Serde(inner) => Self::Storage { message: inner.to_string() },
			forma_storage::Error::InvalidQuery(message) => Self::MalformedQuery { message },
			forma_storage::Error::NotFound(message) => Self::NotFound { message },
			forma_storage::Error::Conflict(message) => Self::Conflict { message },
		}
	}
}

impl From<forma_domain::Error> for Error {
	fn from(err: forma_domain::Error) -> Self {
		Self::Configuration { message: err.to_string() }
	}
}

impl From<forma_domain::HookError> for Error {
	fn from(err: forma_domain::HookError) -> Self {
		Self::Hook { message: err.0 }
	}
}
