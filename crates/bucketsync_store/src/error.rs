//! Error types for storage operations.

use bucketsync_core::BucketId;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the record store and blob backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bucket is not registered.
    #[error("unknown bucket: {0}")]
    UnknownBucket(BucketId),

    /// The bucket is already registered.
    #[error("bucket already exists: {0}")]
    BucketExists(BucketId),

    /// A blob payload did not match its claimed hash.
    #[error("blob hash mismatch for {claimed}")]
    HashMismatch {
        /// The hash the writer claimed.
        claimed: bucketsync_core::ContentHash,
    },

    /// A blob payload exceeded the configured size limit.
    #[error("blob too large: {size} bytes (limit {limit})")]
    BlobTooLarge {
        /// Size of the rejected payload in bytes.
        size: u64,
        /// The configured limit in bytes.
        limit: u64,
    },

    /// A stored blob is corrupt (bad encoding tag, truncated).
    #[error("blob storage corrupted: {0}")]
    Corrupted(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
