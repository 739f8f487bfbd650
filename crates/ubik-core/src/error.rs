// Error types for console wire types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while decoding or parsing console types
#[derive(Debug, Error)]
pub enum CoreError {
    /// Payload is not valid JSON or does not match the event schema
    #[error("Invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was present but empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A string did not name a known enum variant
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

impl CoreError {
    /// Create an unknown variant error
    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        CoreError::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
