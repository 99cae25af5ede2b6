//! The local manifest: last-synced state per path.
//!
//! The manifest is what lets a sync cycle discover changes without
//! re-uploading the world: paths whose (size, mtime) match their entry
//! keep their recorded hash without re-reading the file, and only paths
//! whose content hash actually changed enter the change-set.
//!
//! Persisted as CBOR under `.bucketsync/manifest` inside the sync root
//! and replaced atomically on save. A missing or unreadable manifest is
//! treated as empty; the next cycle then re-uploads nothing that the
//! server already holds thanks to the offer handshake.

use crate::error::ClientResult;
use bucketsync_core::{ManifestEntry, Revision};
use bucketsync_protocol::{from_cbor, to_cbor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Directory inside the sync root holding client state.
pub const STATE_DIR: &str = ".bucketsync";
/// Manifest file name inside [`STATE_DIR`].
pub const MANIFEST_FILE: &str = "manifest";

/// Last-synced state for a whole sync root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Per-path entries, keyed by `/`-separated relative path.
    pub entries: BTreeMap<String, ManifestEntry>,
    /// The bucket revision acknowledged by the last commit.
    pub revision: Revision,
}

impl Manifest {
    /// Returns the manifest path for a sync root.
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join(MANIFEST_FILE)
    }

    /// Loads the manifest for `root`, treating absence or corruption as
    /// an empty manifest.
    pub fn load(root: &Path) -> Self {
        let path = Self::path_for(root);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "manifest unreadable, starting fresh");
                return Self::default();
            }
        };
        match from_cbor(&bytes) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "manifest corrupt, starting fresh");
                Self::default()
            }
        }
    }

    /// Saves the manifest for `root`, replacing the previous file
    /// atomically.
    pub fn save(&self, root: &Path) -> ClientResult<()> {
        let dir = root.join(STATE_DIR);
        fs::create_dir_all(&dir)?;
        let bytes = to_cbor(self)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(Self::path_for(root)).map_err(|err| err.error)?;
        Ok(())
    }

    /// Returns the entry for `path`.
    pub fn entry(&self, path: &str) -> Option<&ManifestEntry> {
        self.entries.get(path)
    }

    /// Inserts or replaces an entry.
    pub fn upsert(&mut self, entry: ManifestEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    /// Removes the entry for `path`.
    pub fn remove(&mut self, path: &str) -> Option<ManifestEntry> {
        self.entries.remove(path)
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no paths are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
