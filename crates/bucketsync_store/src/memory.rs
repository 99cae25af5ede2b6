//! In-memory blob backend for tests and ephemeral deployments.

use crate::blob::{BlobStore, StoredBlob};
use crate::error::StoreResult;
use bucketsync_core::{BlobEncoding, ContentHash};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A blob store backed by a process-local map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<ContentHash, StoredBlob>>,
}

impl MemoryBlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if no blobs are held.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put_blob(
        &self,
        hash: &ContentHash,
        bytes: &[u8],
        encoding: BlobEncoding,
    ) -> StoreResult<()> {
        let mut blobs = self.blobs.write();
        // Idempotent: a present hash keeps its original bytes.
        blobs.entry(*hash).or_insert_with(|| StoredBlob {
            bytes: bytes.to_vec(),
            encoding,
        });
        Ok(())
    }

    fn get_blob(&self, hash: &ContentHash) -> StoreResult<Option<StoredBlob>> {
        Ok(self.blobs.read().get(hash).cloned())
    }

    fn has_blob(&self, hash: &ContentHash) -> StoreResult<bool> {
        Ok(self.blobs.read().contains_key(hash))
    }

    fn delete_blob(&self, hash: &ContentHash) -> StoreResult<()> {
        self.blobs.write().remove(hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketsync_core::hash::hash_bytes;

    #[test]
    fn put_get_has_delete() {
        let store = MemoryBlobStore::new();
        let hash = hash_bytes(b"payload");

        assert!(!store.has_blob(&hash).unwrap());
        store
            .put_blob(&hash, b"payload", BlobEncoding::Raw)
            .unwrap();
        assert!(store.has_blob(&hash).unwrap());

        let blob = store.get_blob(&hash).unwrap().unwrap();
        assert_eq!(blob.bytes, b"payload");
        assert_eq!(blob.encoding, BlobEncoding::Raw);

        store.delete_blob(&hash).unwrap();
        assert!(!store.has_blob(&hash).unwrap());
        // Deleting again is a no-op.
        store.delete_blob(&hash).unwrap();
    }

    #[test]
    fn put_is_idempotent() {
        let store = MemoryBlobStore::new();
        let hash = hash_bytes(b"payload");

        store
            .put_blob(&hash, b"payload", BlobEncoding::Raw)
            .unwrap();
        store
            .put_blob(&hash, b"payload", BlobEncoding::Raw)
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    proptest::proptest! {
        #[test]
        fn any_bytes_roundtrip(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..1024)) {
            let store = MemoryBlobStore::new();
            let hash = hash_bytes(&bytes);
            store.put_blob(&hash, &bytes, BlobEncoding::Raw).unwrap();
            let blob = store.get_blob(&hash).unwrap().unwrap();
            proptest::prop_assert_eq!(blob.bytes, bytes);
        }
    }
}
