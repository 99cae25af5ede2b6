//! Store-side tuning knobs.

use std::time::Duration;

/// Default upper bound on a single blob payload (64 MiB).
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 64 * 1024 * 1024;

/// Default grace period before a tombstone may be purged.
pub const DEFAULT_TOMBSTONE_GRACE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default grace period before an unreferenced blob may be deleted.
pub const DEFAULT_BLOB_GRACE: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for a [`RecordStore`](crate::RecordStore).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Largest blob payload accepted, in bytes.
    pub max_blob_size: u64,
    /// How long a tombstone survives past its last update before
    /// reclamation may purge it.
    pub tombstone_grace: Duration,
    /// How long a blob must sit at zero references before reclamation
    /// may delete it.
    pub blob_grace: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
            tombstone_grace: DEFAULT_TOMBSTONE_GRACE,
            blob_grace: DEFAULT_BLOB_GRACE,
        }
    }
}

impl StoreConfig {
    /// Creates a config with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum accepted blob size.
    pub fn with_max_blob_size(mut self, bytes: u64) -> Self {
        self.max_blob_size = bytes;
        self
    }

    /// Sets the tombstone grace period.
    pub fn with_tombstone_grace(mut self, grace: Duration) -> Self {
        self.tombstone_grace = grace;
        self
    }

    /// Sets the unreferenced-blob grace period.
    pub fn with_blob_grace(mut self, grace: Duration) -> Self {
        self.blob_grace = grace;
        self
    }
}
