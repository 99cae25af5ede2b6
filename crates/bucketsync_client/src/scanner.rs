//! Filesystem scanning for the sync root.

use crate::error::ClientResult;
use crate::manifest::Manifest;
use bucketsync_core::hash::{hash_path, ContentHash};
use bucketsync_core::FileKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::{DirEntry, WalkDir};

/// One regular file found under the sync root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to the sync root, `/`-separated.
    pub path: String,
    /// Absolute path on disk.
    pub abs_path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Modification time, Unix milliseconds.
    pub mtime: u64,
    /// Content hash of the file bytes.
    pub hash: ContentHash,
    /// Classified file kind.
    pub kind: FileKind,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn mtime_millis(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Walks `root` and returns every visible regular file, sorted by path.
///
/// Dotfiles and dot-directories (including the `.bucketsync` state
/// directory) are skipped. Files whose (size, mtime) match their
/// manifest entry keep the entry's hash without re-reading; everything
/// else is re-hashed. Entries that disappear mid-walk are skipped.
pub fn scan(root: &Path, manifest: &Manifest) -> ClientResult<Vec<ScannedFile>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(%err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(rel) = rel.to_str() else {
            tracing::warn!(path = %entry.path().display(), "skipping non-utf8 path");
            continue;
        };
        let path = rel.replace(std::path::MAIN_SEPARATOR, "/");

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let size = metadata.len();
        let mtime = mtime_millis(&metadata);

        // Cheap filter: unchanged (size, mtime) keeps the recorded hash.
        let hash = match manifest.entry(&path) {
            Some(known) if known.size == size && known.mtime == mtime => known.content_hash,
            _ => hash_path(entry.path()),
        };

        files.push(ScannedFile {
            path,
            abs_path: entry.path().to_path_buf(),
            size,
            mtime,
            hash,
            kind: FileKind::from_path(entry.path()),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(root = %root.display(), files = files.len(), "scan complete");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketsync_core::hash::hash_bytes;
    use bucketsync_core::ManifestEntry;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_nested_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), b"alpha").unwrap();
        fs::create_dir(dir.path().join("posts")).unwrap();
        fs::write(dir.path().join("posts/b.md"), b"beta").unwrap();

        let files = scan(dir.path(), &Manifest::default()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "posts/b.md"]);
        assert_eq!(files[0].hash, hash_bytes(b"alpha"));
        assert_eq!(files[0].kind, FileKind::Markdown);
    }

    #[test]
    fn skips_hidden_entries() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("visible.md"), b"x").unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();
        fs::create_dir(dir.path().join(".bucketsync")).unwrap();
        fs::write(dir.path().join(".bucketsync/manifest"), b"state").unwrap();

        let files = scan(dir.path(), &Manifest::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "visible.md");
    }

    #[test]
    fn unchanged_metadata_reuses_manifest_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, b"content").unwrap();
        let metadata = fs::metadata(&path).unwrap();

        // Record a sentinel hash; the scanner must trust it rather than
        // re-read the file.
        let sentinel = hash_bytes(b"sentinel");
        let mut manifest = Manifest::default();
        manifest.upsert(ManifestEntry {
            path: "a.md".into(),
            content_hash: sentinel,
            size: metadata.len(),
            mtime: mtime_millis(&metadata),
            compiled: BTreeMap::new(),
            revision: 1,
            synced_at: 0,
        });

        let files = scan(dir.path(), &manifest).unwrap();
        assert_eq!(files[0].hash, sentinel);
    }

    #[test]
    fn changed_size_rehashes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, b"longer content now").unwrap();

        let mut manifest = Manifest::default();
        manifest.upsert(ManifestEntry {
            path: "a.md".into(),
            content_hash: hash_bytes(b"old"),
            size: 3,
            mtime: 0,
            compiled: BTreeMap::new(),
            revision: 1,
            synced_at: 0,
        });

        let files = scan(dir.path(), &manifest).unwrap();
        assert_eq!(files[0].hash, hash_bytes(b"longer content now"));
    }

    #[test]
    fn empty_root() {
        let dir = TempDir::new().unwrap();
        let files = scan(dir.path(), &Manifest::default()).unwrap();
        assert!(files.is_empty());
    }
}
