//! Error types for rewind-core

use thiserror::Error;

/// Main error type for the rewind-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging setup error
    #[error("logging error: {0}")]
    Logging(String),

    /// Year outside the representable calendar range
    #[error("invalid year: {0}")]
    InvalidYear(i32),

    /// An aggregate does not match its output schema
    #[error("{kind} stats schema violation: {message}")]
    SchemaViolation { kind: String, message: String },

    /// Record source failure
    #[error("record source error: {0}")]
    Source(String),

    /// External show metadata could not be fetched
    #[error("show metadata unavailable: {0}")]
    MetadataUnavailable(String),
}

impl Error {
    pub(crate) fn schema(kind: impl ToString, message: impl Into<String>) -> Self {
        Error::SchemaViolation {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for rewind-core
pub type Result<T> = std::result::Result<T, Error>;
