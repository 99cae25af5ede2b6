//! Change-set operations.

use bucketsync_core::{BlobEncoding, ContentHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the payload of a put operation comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadSource {
    /// Payload bytes travel inline with the operation.
    Inline {
        /// The payload bytes.
        bytes: Vec<u8>,
        /// Encoding of the bytes at rest.
        encoding: BlobEncoding,
    },
    /// Payload was transferred ahead of time; the operation cites its hash.
    ///
    /// The server rejects the op with `MissingBlob` if the hash is absent.
    Reference {
        /// Content hash of the previously uploaded blob.
        hash: ContentHash,
    },
}

/// One operation inside a batched change-set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOp {
    /// Create or replace the record at `path`.
    Put {
        /// Path relative to the bucket root.
        path: String,
        /// Plaintext-derived identity of the raw content.
        content_hash: ContentHash,
        /// Raw content size in bytes.
        size: u64,
        /// Source modification time, Unix milliseconds.
        mtime: u64,
        /// Compiled variant name → artifact hash.
        compiled: BTreeMap<String, ContentHash>,
        /// Raw payload, inline or by reference.
        payload: PayloadSource,
    },
    /// Tombstone the record at `path`.
    Delete {
        /// Path relative to the bucket root.
        path: String,
    },
}

impl ChangeOp {
    /// Returns the path this operation affects.
    pub fn path(&self) -> &str {
        match self {
            ChangeOp::Put { path, .. } | ChangeOp::Delete { path } => path,
        }
    }

    /// Returns true for delete operations.
    pub fn is_delete(&self) -> bool {
        matches!(self, ChangeOp::Delete { .. })
    }

    /// Size of any inline payload, zero otherwise.
    pub fn inline_payload_size(&self) -> usize {
        match self {
            ChangeOp::Put {
                payload: PayloadSource::Inline { bytes, .. },
                ..
            } => bytes.len(),
            _ => 0,
        }
    }
}
