//! The record/blob data model shared by client, wire, and store.

use crate::hash::ContentHash;
use crate::keys::{BucketId, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-bucket revision counter. Strictly increases with every committed
/// change-set that touches the bucket.
pub type Revision = u64;

/// Returns the current wall clock as Unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// How a blob payload is encoded at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobEncoding {
    /// Source bytes as scanned from disk.
    Raw,
    /// Output of the compiler pipeline.
    Compiled,
    /// Client-side encrypted; opaque to the server.
    Encrypted,
}

/// Authoritative metadata for one path inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Path relative to the bucket root, `/`-separated.
    pub path: String,
    /// Identity of the raw content (always plaintext-derived).
    pub content_hash: ContentHash,
    /// Size of the raw content in bytes.
    pub size: u64,
    /// Source modification time, Unix milliseconds.
    pub mtime: u64,
    /// Compiled variant name → artifact hash.
    pub compiled: BTreeMap<String, ContentHash>,
    /// Revision of the change-set that last touched this record.
    pub revision: Revision,
    /// Tombstone flag; deleted records are retained until reclamation.
    pub deleted: bool,
    /// Server-side update time, Unix milliseconds.
    pub updated_at: u64,
}

impl Record {
    /// Returns every hash this record cites (content + compiled variants).
    pub fn cited_hashes(&self) -> Vec<ContentHash> {
        let mut hashes = Vec::with_capacity(1 + self.compiled.len());
        hashes.push(self.content_hash);
        hashes.extend(self.compiled.values().copied());
        hashes
    }
}

/// A registered tenant bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Identity derived from the public key.
    pub id: BucketId,
    /// The bucket's public key.
    pub public_key: PublicKey,
    /// Optional private key, encrypted client-side before escrow.
    pub encrypted_private_key: Option<Vec<u8>>,
    /// Opaque configuration blob.
    pub config: Vec<u8>,
    /// Creation time, Unix milliseconds.
    pub created_at: u64,
}

/// Client-side last-known state for one path, persisted in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the sync root, `/`-separated.
    pub path: String,
    /// Last content hash committed to the server.
    pub content_hash: ContentHash,
    /// Raw size at last commit, used by the cheap scan filter.
    pub size: u64,
    /// Source mtime at last commit, used by the cheap scan filter.
    pub mtime: u64,
    /// Compiled hashes at last commit.
    pub compiled: BTreeMap<String, ContentHash>,
    /// Bucket revision returned by the commit that covered this entry.
    pub revision: Revision,
    /// When the entry was last acknowledged, Unix milliseconds.
    pub synced_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    #[test]
    fn record_cited_hashes() {
        let mut compiled = BTreeMap::new();
        compiled.insert("html".to_string(), hash_bytes(b"<p>x</p>"));

        let record = Record {
            path: "post.md".into(),
            content_hash: hash_bytes(b"x"),
            size: 1,
            mtime: 0,
            compiled,
            revision: 1,
            deleted: false,
            updated_at: 0,
        };

        let cited = record.cited_hashes();
        assert_eq!(cited.len(), 2);
        assert!(cited.contains(&hash_bytes(b"x")));
        assert!(cited.contains(&hash_bytes(b"<p>x</p>")));
    }
}
