//! Error types for the sync client.
//!
//! Errors split along one line that matters to the engine: whether
//! repeating the request could help. Unreachable servers and timeouts
//! are worth retrying; refused proofs and unrecoverable conflicts are
//! not, and end the cycle immediately.

use bucketsync_core::Revision;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur during sync.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server could not be reached.
    #[error("server unreachable: {0}")]
    Network(String),

    /// A request exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// Wire encode/decode failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server refused our write proof.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The server rejected the request for a non-auth reason.
    #[error("server error: {0}")]
    ServerError(String),

    /// The change-set base revision was stale and the conflict could not
    /// be recovered by pulling and re-diffing.
    #[error("revision conflict: server is at revision {current_revision}")]
    Conflict {
        /// The server's current revision.
        current_revision: Revision,
    },

    /// A key, hash, or crypto operation failed.
    #[error(transparent)]
    Core(#[from] bucketsync_core::CoreError),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A sync was started while another was in flight.
    #[error("sync already in progress (phase {phase})")]
    AlreadySyncing {
        /// The phase the running sync is in.
        phase: String,
    },

    /// I/O error reading the sync root or manifest.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns true if repeating the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Network(_) | ClientError::Timeout | ClientError::ServerError(_)
        )
    }
}

impl From<bucketsync_protocol::ProtocolError> for ClientError {
    fn from(err: bucketsync_protocol::ProtocolError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}
