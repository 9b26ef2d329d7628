//! Error types for the control-line protocol.

use thiserror::Error;

/// Errors that can occur while encoding, decoding or moving control lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A request line that does not match the variant's grammar.
    #[error("Invalid request line: {0}")]
    InvalidRequest(String),

    /// A response line that does not match the variant's grammar.
    #[error("Unexpected response line: {0}")]
    UnexpectedResponse(String),

    /// A value that cannot be carried on a single control line.
    #[error("Cannot encode on one line: {0}")]
    Unencodable(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Pipe read/write failure.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The peer closed its end (EOF).
    #[error("Channel closed")]
    ChannelClosed,

    /// Timeout waiting for a line.
    #[error("Timeout waiting for response")]
    Timeout,
}

impl ProtocolError {
    /// True if the peer is gone rather than merely misbehaving.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ProtocolError::ChannelClosed | ProtocolError::IoError(_))
    }
}
