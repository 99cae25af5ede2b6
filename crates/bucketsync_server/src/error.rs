//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No handler registered for the requested endpoint.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Protocol version mismatch.
    #[error("protocol version mismatch: {0}")]
    ProtocolMismatch(String),

    /// A storage operation failed.
    #[error(transparent)]
    Store(#[from] bucketsync_store::StoreError),

    /// A wire encode/decode failed.
    #[error(transparent)]
    Protocol(#[from] bucketsync_protocol::ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::InvalidRequest(_)
            | ServerError::AuthenticationFailed(_)
            | ServerError::UnknownEndpoint(_)
            | ServerError::ProtocolMismatch(_) => true,
            ServerError::Store(err) => !matches!(err, bucketsync_store::StoreError::Io(_)),
            ServerError::Protocol(err) => {
                matches!(err, bucketsync_protocol::ProtocolError::Decode(_))
            }
            ServerError::Internal(_) => false,
        }
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::AuthenticationFailed("stale nonce".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::Internal("oops".into()).is_client_error());
    }

    #[test]
    fn store_io_is_server_error() {
        let err = ServerError::Store(bucketsync_store::StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk gone",
        )));
        assert!(err.is_server_error());
    }
}
