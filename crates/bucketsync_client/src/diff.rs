//! Diffing scanned state against the manifest.

use crate::manifest::Manifest;
use crate::scanner::ScannedFile;

/// One local change the next change-set must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalChange {
    /// A file that is new or whose content hash changed.
    Upsert(ScannedFile),
    /// A tracked path that no longer exists on disk.
    Delete {
        /// Path relative to the sync root.
        path: String,
    },
}

impl LocalChange {
    /// Returns the path this change affects.
    pub fn path(&self) -> &str {
        match self {
            LocalChange::Upsert(file) => &file.path,
            LocalChange::Delete { path } => path,
        }
    }

    /// Returns true for deletions.
    pub fn is_delete(&self) -> bool {
        matches!(self, LocalChange::Delete { .. })
    }
}

/// Compares a scan against the manifest.
///
/// A path counts as modified only when its content hash differs from
/// the manifest entry; touched-but-identical files produce no change.
/// Paths tracked in the manifest but absent from the scan become
/// deletions. The result is ordered: upserts first (scan order), then
/// deletions.
pub fn diff(scanned: &[ScannedFile], manifest: &Manifest) -> Vec<LocalChange> {
    let mut changes = Vec::new();

    for file in scanned {
        match manifest.entry(&file.path) {
            Some(entry) if entry.content_hash == file.hash => {}
            _ => changes.push(LocalChange::Upsert(file.clone())),
        }
    }

    for path in manifest.entries.keys() {
        if !scanned.iter().any(|f| &f.path == path) {
            changes.push(LocalChange::Delete { path: path.clone() });
        }
    }

    changes
}
