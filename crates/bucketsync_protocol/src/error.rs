//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A value failed to encode to CBOR.
    #[error("encode error: {0}")]
    Encode(String),

    /// A payload failed to decode from CBOR.
    #[error("decode error: {0}")]
    Decode(String),

    /// A structurally valid message violated a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Creates an invalid-message error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }
}
