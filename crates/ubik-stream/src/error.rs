// Error types for the log stream
//
// Errors are stored as the stream's last error and handed out to consumers,
// so they are cloneable and carry messages rather than source errors.

use thiserror::Error;
use ubik_core::CoreError;

/// Result type alias for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while delivering the live log stream
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The session cookie is missing or no longer valid
    #[error("Unauthenticated: no valid console session")]
    Unauthenticated,

    /// Token endpoint answered with an unexpected status
    #[error("Token endpoint error ({status}): {message}")]
    TokenEndpoint { status: u16, message: String },

    /// HTTP request to the token endpoint failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Socket-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// A received payload is not a valid activity event
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// The socket closed
    #[error("Connection lost")]
    ConnectionLost,

    /// A configured URL could not be parsed or used
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl StreamError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        StreamError::Transport(msg.into())
    }

    /// Create an invalid URL error
    pub fn invalid_url(msg: impl Into<String>) -> Self {
        StreamError::InvalidUrl(msg.into())
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Http(err.to_string())
    }
}

impl From<url::ParseError> for StreamError {
    fn from(err: url::ParseError) -> Self {
        StreamError::InvalidUrl(err.to_string())
    }
}

impl From<CoreError> for StreamError {
    fn from(err: CoreError) -> Self {
        StreamError::MalformedMessage(err.to_string())
    }
}
