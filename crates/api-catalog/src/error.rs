//! Error types for the API catalog

use thiserror::Error;

/// Result type alias for catalog operations
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Catalog error types
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Malformed security declaration or unresolved security reference
    #[error("{0}")]
    Configuration(String),

    /// Request body declared with a media type other than `application/json`
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// A credential field required by a security scheme is missing
    #[error("{0}")]
    Auth(String),

    /// Failure reported by the HTTP transport, passed through untouched
    #[error(transparent)]
    Transport(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("Failed to fetch API spec: {0}")]
    FetchError(String),

    #[error("Invalid API spec format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unsupported OpenAPI version: {0}")]
    UnsupportedVersion(String),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CatalogError {
    /// Whether this error means the spec itself cannot be compiled into a catalog
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CatalogError::Configuration(_) | CatalogError::UnsupportedMediaType(_)
        )
    }
}
