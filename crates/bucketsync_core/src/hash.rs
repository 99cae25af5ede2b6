//! Content identity: deterministic SHA-256 hashing of byte streams.
//!
//! Every blob in the system is addressed by the hash of its bytes, so two
//! byte-identical files anywhere on the platform map to the same identity
//! regardless of path, name, or timestamps. Hashing streams fixed-size
//! blocks and is bounded-memory for arbitrarily large files.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;

/// Block size used when streaming a reader through the hasher.
pub const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// A content hash: the SHA-256 digest of a byte payload.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// The identity of an empty or unreadable payload.
    ///
    /// Missing and unreadable paths degrade to this value so that a scan
    /// never aborts on one bad entry.
    pub const EMPTY: ContentHash = ContentHash([0u8; 32]);

    /// Sentinel identity assigned to directories.
    pub const DIRECTORY: ContentHash = ContentHash([0xFFu8; 32]);

    /// Creates a hash from raw digest bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parses a hash from its lowercase hex form.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let digest: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(digest))
    }

    /// Returns the lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns true if this is the empty sentinel.
    pub fn is_empty_sentinel(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..12])
    }
}

/// Incremental content hasher.
///
/// Feed bytes in any block sizes; the digest depends only on the
/// concatenated byte sequence.
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Creates a fresh hasher.
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Absorbs a block of bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Finalizes the digest.
    pub fn finish(self) -> ContentHash {
        ContentHash(self.inner.finalize().into())
    }
}

/// Hashes an in-memory payload.
pub fn hash_bytes(bytes: &[u8]) -> ContentHash {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finish()
}

/// Hashes a reader by streaming fixed-size blocks.
///
/// Memory use is bounded by [`HASH_BLOCK_SIZE`] regardless of input size.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<ContentHash> {
    let mut hasher = ContentHasher::new();
    let mut block = vec![0u8; HASH_BLOCK_SIZE];
    loop {
        let n = reader.read(&mut block)?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }
    Ok(hasher.finish())
}

/// Hashes the content at a filesystem path.
///
/// Directories map to [`ContentHash::DIRECTORY`]; missing or unreadable
/// paths map to [`ContentHash::EMPTY`]. This function never returns an
/// error so that a tree scan cannot be aborted by one bad entry.
pub fn hash_path(path: &Path) -> ContentHash {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => ContentHash::DIRECTORY,
        Ok(_) => match std::fs::File::open(path) {
            Ok(file) => hash_reader(std::io::BufReader::new(file)).unwrap_or(ContentHash::EMPTY),
            Err(_) => ContentHash::EMPTY,
        },
        Err(_) => ContentHash::EMPTY,
    }
}
