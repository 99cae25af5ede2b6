//! Change notifications for downstream consumers (search indexing, render
//! cache invalidation).
//!
//! Notifications are emitted only after a change-set commits and are
//! consumed by polling; the store never blocks acknowledgment on a
//! consumer.

use bucketsync_core::{BucketId, Revision};
use serde::{Deserialize, Serialize};

/// One committed change, as seen by downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// Cursor assigned by the feed, strictly increasing.
    pub sequence: u64,
    /// Bucket the change belongs to.
    pub bucket_id: BucketId,
    /// Path that changed.
    pub path: String,
    /// Bucket revision of the committing batch.
    pub revision: Revision,
}

/// Retention bound on the feed. When emits outrun consumption, the
/// oldest events are dropped; a consumer that lags this far behind
/// misses them rather than pinning server memory.
pub const MAX_RETAINED: usize = 4096;

/// A poll-based feed of committed changes.
pub struct NotificationFeed {
    events: Vec<ChangeNotification>,
    next_sequence: u64,
}

impl NotificationFeed {
    /// Creates an empty feed.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Emits one notification, assigning the next cursor.
    pub fn emit(&mut self, bucket_id: BucketId, path: impl Into<String>, revision: Revision) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(ChangeNotification {
            sequence,
            bucket_id,
            path: path.into(),
            revision,
        });
        if self.events.len() > MAX_RETAINED {
            let excess = self.events.len() - MAX_RETAINED;
            self.events.drain(..excess);
        }
    }

    /// Returns notifications with `sequence > cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeNotification> {
        self.events
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the highest assigned cursor.
    pub fn latest_sequence(&self) -> u64 {
        self.next_sequence.saturating_sub(1)
    }

    /// Drops notifications with `sequence < before`, once consumers have
    /// caught up.
    pub fn truncate_before(&mut self, before: u64) {
        self.events.retain(|e| e.sequence >= before);
    }

    /// Number of retained notifications.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no notifications are retained.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new()
    }
}
