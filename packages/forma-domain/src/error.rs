#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Failed to load resource manifest {path}: {message}")]
	Manifest { path: String, message: String },
}
