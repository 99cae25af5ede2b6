//! Blob storage capability trait.

use crate::error::StoreResult;
use bucketsync_core::{BlobEncoding, ContentHash};

/// A stored blob payload with its encoding tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Payload bytes.
    pub bytes: Vec<u8>,
    /// Encoding of the payload at rest.
    pub encoding: BlobEncoding,
}

/// Content-addressed byte storage.
///
/// Backends are opaque byte stores keyed by content hash. The record store
/// accesses blobs only through this interface and never inspects which
/// concrete backend is active; the backend is chosen at construction time
/// from configuration.
///
/// # Invariants
///
/// - `put_blob` is idempotent: writing an already-present hash confirms
///   existence without rewriting bytes
/// - `get_blob` returns exactly the bytes stored under the hash
/// - `delete_blob` of an absent hash is a no-op
/// - Implementations must be `Send + Sync`
pub trait BlobStore: Send + Sync {
    /// Stores a payload under its content hash.
    fn put_blob(&self, hash: &ContentHash, bytes: &[u8], encoding: BlobEncoding)
        -> StoreResult<()>;

    /// Fetches a payload, or `None` if the hash is absent.
    fn get_blob(&self, hash: &ContentHash) -> StoreResult<Option<StoredBlob>>;

    /// Returns true if the hash is present.
    fn has_blob(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Removes a payload. Absent hashes are ignored.
    fn delete_blob(&self, hash: &ContentHash) -> StoreResult<()>;
}
