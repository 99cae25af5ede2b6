//! Filesystem blob backend.
//!
//! Blobs land under a sharded directory tree keyed by content hash:
//! `<root>/<first two hex chars>/<remaining hex chars>`. Each file
//! starts with a one-byte encoding tag followed by the payload. Writes
//! go through a temp file in the destination shard and are persisted
//! atomically, so readers never observe a partial blob.

use crate::blob::{BlobStore, StoredBlob};
use crate::error::{StoreError, StoreResult};
use bucketsync_core::{BlobEncoding, ContentHash};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TAG_RAW: u8 = 0;
const TAG_COMPILED: u8 = 1;
const TAG_ENCRYPTED: u8 = 2;

fn encoding_tag(encoding: BlobEncoding) -> u8 {
    match encoding {
        BlobEncoding::Raw => TAG_RAW,
        BlobEncoding::Compiled => TAG_COMPILED,
        BlobEncoding::Encrypted => TAG_ENCRYPTED,
    }
}

fn tag_encoding(tag: u8) -> StoreResult<BlobEncoding> {
    match tag {
        TAG_RAW => Ok(BlobEncoding::Raw),
        TAG_COMPILED => Ok(BlobEncoding::Compiled),
        TAG_ENCRYPTED => Ok(BlobEncoding::Encrypted),
        other => Err(StoreError::Corrupted(format!(
            "unknown blob encoding tag {other}"
        ))),
    }
}

/// A blob store rooted at a directory on disk.
#[derive(Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens (creating if needed) a blob store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ContentHash) -> (PathBuf, PathBuf) {
        let hex = hash.to_hex();
        let shard = self.root.join(&hex[..2]);
        let file = shard.join(&hex[2..]);
        (shard, file)
    }
}

impl BlobStore for FsBlobStore {
    fn put_blob(
        &self,
        hash: &ContentHash,
        bytes: &[u8],
        encoding: BlobEncoding,
    ) -> StoreResult<()> {
        let (shard, path) = self.blob_path(hash);
        if path.exists() {
            // Content-addressed: an existing file already holds these bytes.
            return Ok(());
        }
        fs::create_dir_all(&shard)?;
        let mut tmp = NamedTempFile::new_in(&shard)?;
        tmp.write_all(&[encoding_tag(encoding)])?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|err| err.error)?;
        Ok(())
    }

    fn get_blob(&self, hash: &ContentHash) -> StoreResult<Option<StoredBlob>> {
        let (_, path) = self.blob_path(hash);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let Some((&tag, payload)) = data.split_first() else {
            return Err(StoreError::Corrupted(format!(
                "empty blob file for {hash}"
            )));
        };
        Ok(Some(StoredBlob {
            bytes: payload.to_vec(),
            encoding: tag_encoding(tag)?,
        }))
    }

    fn has_blob(&self, hash: &ContentHash) -> StoreResult<bool> {
        let (_, path) = self.blob_path(hash);
        Ok(path.exists())
    }

    fn delete_blob(&self, hash: &ContentHash) -> StoreResult<()> {
        let (_, path) = self.blob_path(hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketsync_core::hash::hash_bytes;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let hash = hash_bytes(b"hello blob");

        assert!(store.get_blob(&hash).unwrap().is_none());
        store
            .put_blob(&hash, b"hello blob", BlobEncoding::Raw)
            .unwrap();
        let blob = store.get_blob(&hash).unwrap().unwrap();
        assert_eq!(blob.bytes, b"hello blob");
        assert_eq!(blob.encoding, BlobEncoding::Raw);
    }

    #[test]
    fn shards_by_hash_prefix() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let hash = hash_bytes(b"sharded");
        store
            .put_blob(&hash, b"sharded", BlobEncoding::Raw)
            .unwrap();

        let hex = hash.to_hex();
        let expected = dir.path().join(&hex[..2]).join(&hex[2..]);
        assert!(expected.is_file());
    }

    #[test]
    fn encoding_tag_survives_reload() {
        let dir = TempDir::new().unwrap();
        let hash = hash_bytes(b"ciphertext");
        {
            let store = FsBlobStore::open(dir.path()).unwrap();
            store
                .put_blob(&hash, b"ciphertext", BlobEncoding::Encrypted)
                .unwrap();
        }
        let store = FsBlobStore::open(dir.path()).unwrap();
        let blob = store.get_blob(&hash).unwrap().unwrap();
        assert_eq!(blob.encoding, BlobEncoding::Encrypted);
    }

    #[test]
    fn put_keeps_first_write() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        let hash = hash_bytes(b"original");
        store
            .put_blob(&hash, b"original", BlobEncoding::Raw)
            .unwrap();
        store
            .put_blob(&hash, b"original", BlobEncoding::Compiled)
            .unwrap();
        let blob = store.get_blob(&hash).unwrap().unwrap();
        assert_eq!(blob.encoding, BlobEncoding::Raw);
    }

    #[test]
    fn delete_missing_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path()).unwrap();
        store.delete_blob(&hash_bytes(b"absent")).unwrap();
    }
}
