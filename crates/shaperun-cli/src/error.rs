//! Error types for the gateway client.

use thiserror::Error;

/// Errors that can occur when talking to the gateway.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with an error status.
    #[error("gateway returned {status}: {message}")]
    Rejected { status: u16, message: String },

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed `--param` argument.
    #[error("invalid parameter '{0}': {1}")]
    InvalidParam(String, String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Local file error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
