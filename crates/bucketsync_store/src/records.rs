//! The authoritative record store.
//!
//! One [`RecordStore`] serves every bucket of a deployment. Records map
//! paths to content metadata; payload bytes live in the shared
//! [`BlobStore`] and are reference-counted across all buckets, so
//! identical content is stored once platform-wide.
//!
//! Change-sets are applied one batch at a time per bucket (a per-bucket
//! mutex), while different buckets commit in parallel.

use crate::blob::{BlobStore, StoredBlob};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use bucketsync_core::{
    now_millis, BlobEncoding, BucketId, BucketInfo, ContentHash, PublicKey, Record, Revision,
};
use bucketsync_protocol::{
    ChangeNotification, ChangeOp, ChangeSetResponse, NotificationFeed, PayloadSource,
    RejectReason, RejectedOp,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Reference-count bookkeeping for one blob.
#[derive(Debug, Clone, Copy)]
struct BlobRef {
    count: u64,
    /// When the count last dropped to zero, Unix milliseconds. `None`
    /// while the blob is referenced.
    zero_since: Option<u64>,
}

#[derive(Debug, Default)]
struct BucketRecords {
    records: BTreeMap<String, Record>,
    revision: Revision,
}

struct BucketState {
    info: BucketInfo,
    inner: Mutex<BucketRecords>,
}

/// What a reclamation pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimReport {
    /// Tombstones purged past their grace period.
    pub tombstones_purged: usize,
    /// Unreferenced blobs deleted past their grace period.
    pub blobs_deleted: usize,
}

/// A multi-tenant record store over a shared blob backend.
pub struct RecordStore {
    blobs: Arc<dyn BlobStore>,
    buckets: RwLock<HashMap<BucketId, Arc<BucketState>>>,
    refcounts: Mutex<HashMap<ContentHash, BlobRef>>,
    feed: Mutex<NotificationFeed>,
    config: StoreConfig,
}

impl RecordStore {
    /// Creates a store over the given blob backend.
    pub fn new(blobs: Arc<dyn BlobStore>, config: StoreConfig) -> Self {
        Self {
            blobs,
            buckets: RwLock::new(HashMap::new()),
            refcounts: Mutex::new(HashMap::new()),
            feed: Mutex::new(NotificationFeed::new()),
            config,
        }
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Buckets

    /// Registers a bucket for `public_key`. The bucket id is derived from
    /// the key, so one keypair maps to exactly one bucket.
    pub fn create_bucket(
        &self,
        public_key: PublicKey,
        config: Vec<u8>,
        encrypted_private_key: Option<Vec<u8>>,
    ) -> StoreResult<BucketInfo> {
        let id = public_key.bucket_id();
        let mut buckets = self.buckets.write();
        if buckets.contains_key(&id) {
            return Err(StoreError::BucketExists(id));
        }
        let info = BucketInfo {
            id,
            public_key,
            encrypted_private_key,
            config,
            created_at: now_millis(),
        };
        tracing::info!(bucket = %id, "bucket created");
        buckets.insert(
            id,
            Arc::new(BucketState {
                info: info.clone(),
                inner: Mutex::new(BucketRecords::default()),
            }),
        );
        Ok(info)
    }

    /// Returns the registered bucket metadata.
    pub fn get_bucket(&self, id: &BucketId) -> StoreResult<BucketInfo> {
        Ok(self.state(id)?.info.clone())
    }

    /// Returns true if the bucket is registered.
    pub fn bucket_exists(&self, id: &BucketId) -> bool {
        self.buckets.read().contains_key(id)
    }

    fn state(&self, id: &BucketId) -> StoreResult<Arc<BucketState>> {
        self.buckets
            .read()
            .get(id)
            .cloned()
            .ok_or(StoreError::UnknownBucket(*id))
    }

    // ------------------------------------------------------------------
    // Reads

    /// Returns the record at `path`, tombstones included.
    pub fn get_record(&self, id: &BucketId, path: &str) -> StoreResult<Option<Record>> {
        let state = self.state(id)?;
        let inner = state.inner.lock();
        Ok(inner.records.get(path).cloned())
    }

    /// Returns records with `revision > since`, plus the current revision.
    pub fn records_since(
        &self,
        id: &BucketId,
        since: Revision,
    ) -> StoreResult<(Vec<Record>, Revision)> {
        let state = self.state(id)?;
        let inner = state.inner.lock();
        let records = inner
            .records
            .values()
            .filter(|r| r.revision > since)
            .cloned()
            .collect();
        Ok((records, inner.revision))
    }

    /// Returns the bucket's current revision.
    pub fn current_revision(&self, id: &BucketId) -> StoreResult<Revision> {
        let state = self.state(id)?;
        let revision = state.inner.lock().revision;
        Ok(revision)
    }

    // ------------------------------------------------------------------
    // Blobs

    /// Splits offered hashes into (known, needed).
    pub fn missing_blobs(
        &self,
        hashes: &[ContentHash],
    ) -> StoreResult<(Vec<ContentHash>, Vec<ContentHash>)> {
        let mut known = Vec::new();
        let mut needed = Vec::new();
        for hash in hashes {
            if self.blobs.has_blob(hash)? {
                known.push(*hash);
            } else {
                needed.push(*hash);
            }
        }
        Ok((known, needed))
    }

    /// Stores one blob ahead of a change-set.
    ///
    /// The claimed hash is verified against the bytes except for
    /// encrypted payloads, whose identity is derived from the plaintext
    /// the server never sees. Freshly stored blobs start unreferenced and
    /// are reclaimed if no record ever cites them.
    pub fn put_blob(
        &self,
        hash: &ContentHash,
        bytes: &[u8],
        encoding: BlobEncoding,
    ) -> StoreResult<()> {
        if bytes.len() as u64 > self.config.max_blob_size {
            return Err(StoreError::BlobTooLarge {
                size: bytes.len() as u64,
                limit: self.config.max_blob_size,
            });
        }
        if encoding != BlobEncoding::Encrypted {
            let actual = bucketsync_core::hash::hash_bytes(bytes);
            if actual != *hash {
                return Err(StoreError::HashMismatch { claimed: *hash });
            }
        }
        self.blobs.put_blob(hash, bytes, encoding)?;
        self.refcounts.lock().entry(*hash).or_insert(BlobRef {
            count: 0,
            zero_since: Some(now_millis()),
        });
        Ok(())
    }

    /// Fetches one blob by hash.
    pub fn get_blob(&self, hash: &ContentHash) -> StoreResult<Option<StoredBlob>> {
        self.blobs.get_blob(hash)
    }

    /// Returns true if the blob is present.
    pub fn has_blob(&self, hash: &ContentHash) -> StoreResult<bool> {
        self.blobs.has_blob(hash)
    }

    #[cfg(test)]
    fn refcount(&self, hash: &ContentHash) -> u64 {
        self.refcounts
            .lock()
            .get(hash)
            .map(|r| r.count)
            .unwrap_or(0)
    }

    fn incref(refcounts: &mut HashMap<ContentHash, BlobRef>, hash: ContentHash) {
        let entry = refcounts.entry(hash).or_insert(BlobRef {
            count: 0,
            zero_since: None,
        });
        entry.count += 1;
        entry.zero_since = None;
    }

    fn decref(refcounts: &mut HashMap<ContentHash, BlobRef>, hash: ContentHash, now: u64) {
        if let Some(entry) = refcounts.get_mut(&hash) {
            entry.count = entry.count.saturating_sub(1);
            if entry.count == 0 {
                entry.zero_since = Some(now);
            }
        }
    }

    // ------------------------------------------------------------------
    // Change-sets

    /// Applies a batched change-set atomically against `base_revision`.
    ///
    /// A stale `base_revision` rejects the whole batch with `Conflict`
    /// unless `force` is set, in which case last-writer-wins. Individual
    /// malformed or blob-missing operations are rejected without failing
    /// the rest of the batch. The bucket revision advances exactly once
    /// per batch, and only when at least one operation mutated state;
    /// re-applying an already-committed batch is accepted without
    /// mutation.
    pub fn apply_change_set(
        &self,
        id: &BucketId,
        base_revision: Revision,
        force: bool,
        ops: &[ChangeOp],
    ) -> StoreResult<ChangeSetResponse> {
        let state = self.state(id)?;
        let mut inner = state.inner.lock();

        if base_revision != inner.revision && !force {
            tracing::debug!(
                bucket = %id,
                base = base_revision,
                current = inner.revision,
                "change-set rejected: stale base revision"
            );
            return Ok(ChangeSetResponse::conflict(
                ops.iter().map(|op| op.path().to_string()),
                inner.revision,
            ));
        }

        let next_revision = inner.revision + 1;
        let now = now_millis();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut blobs_needed = Vec::new();
        let mut mutated = Vec::new();

        for op in ops {
            match self.apply_op(&mut inner, op, next_revision, now) {
                Ok(did_mutate) => {
                    accepted.push(op.path().to_string());
                    if did_mutate {
                        mutated.push(op.path().to_string());
                    }
                }
                Err(reason) => {
                    if let RejectReason::MissingBlob(hash) = &reason {
                        if !blobs_needed.contains(hash) {
                            blobs_needed.push(*hash);
                        }
                    }
                    rejected.push(RejectedOp {
                        path: op.path().to_string(),
                        reason,
                    });
                }
            }
        }

        if !mutated.is_empty() {
            inner.revision = next_revision;
            // Mutated records were written with next_revision already.
            let mut feed = self.feed.lock();
            for path in &mutated {
                feed.emit(*id, path.clone(), next_revision);
            }
        }

        tracing::debug!(
            bucket = %id,
            accepted = accepted.len(),
            rejected = rejected.len(),
            revision = inner.revision,
            "change-set applied"
        );

        Ok(ChangeSetResponse {
            accepted,
            rejected,
            new_revision: inner.revision,
            blobs_needed,
        })
    }

    /// Applies one op. Returns whether state changed, or the reject reason.
    fn apply_op(
        &self,
        inner: &mut BucketRecords,
        op: &ChangeOp,
        next_revision: Revision,
        now: u64,
    ) -> Result<bool, RejectReason> {
        validate_path(op.path())?;

        match op {
            ChangeOp::Delete { path } => {
                match inner.records.get_mut(path) {
                    // Absent or already tombstoned: idempotent accept.
                    None => Ok(false),
                    Some(record) if record.deleted => Ok(false),
                    Some(record) => {
                        let previous = record.cited_hashes();
                        record.deleted = true;
                        record.content_hash = ContentHash::EMPTY;
                        record.size = 0;
                        record.compiled.clear();
                        record.revision = next_revision;
                        record.updated_at = now;

                        let mut refcounts = self.refcounts.lock();
                        for hash in previous {
                            Self::decref(&mut refcounts, hash, now);
                        }
                        Ok(true)
                    }
                }
            }
            ChangeOp::Put {
                path,
                content_hash,
                size,
                mtime,
                compiled,
                payload,
            } => {
                // Re-putting identical content is an idempotent accept.
                if let Some(existing) = inner.records.get(path) {
                    if !existing.deleted
                        && existing.content_hash == *content_hash
                        && existing.compiled == *compiled
                    {
                        return Ok(false);
                    }
                }

                match payload {
                    PayloadSource::Inline { bytes, encoding } => {
                        self.put_blob(content_hash, bytes, *encoding)
                            .map_err(|err| match err {
                                StoreError::HashMismatch { .. }
                                | StoreError::BlobTooLarge { .. } => {
                                    RejectReason::Validation(err.to_string())
                                }
                                other => RejectReason::Validation(other.to_string()),
                            })?;
                    }
                    PayloadSource::Reference { hash } => {
                        if hash != content_hash {
                            return Err(RejectReason::Validation(
                                "payload reference does not match content hash".into(),
                            ));
                        }
                        if !self.blobs.has_blob(hash).unwrap_or(false) {
                            return Err(RejectReason::MissingBlob(*hash));
                        }
                    }
                }
                for hash in compiled.values() {
                    if !self.blobs.has_blob(hash).unwrap_or(false) {
                        return Err(RejectReason::MissingBlob(*hash));
                    }
                }

                let previous = inner
                    .records
                    .get(path)
                    .filter(|r| !r.deleted)
                    .map(Record::cited_hashes);

                let record = Record {
                    path: path.clone(),
                    content_hash: *content_hash,
                    size: *size,
                    mtime: *mtime,
                    compiled: compiled.clone(),
                    revision: next_revision,
                    deleted: false,
                    updated_at: now,
                };

                let mut refcounts = self.refcounts.lock();
                for hash in record.cited_hashes() {
                    Self::incref(&mut refcounts, hash);
                }
                if let Some(previous) = previous {
                    for hash in previous {
                        Self::decref(&mut refcounts, hash, now);
                    }
                }
                drop(refcounts);

                inner.records.insert(path.clone(), record);
                Ok(true)
            }
        }
    }

    // ------------------------------------------------------------------
    // Notifications

    /// Returns committed-change notifications with `sequence > cursor`.
    pub fn poll_notifications(&self, cursor: u64, limit: usize) -> Vec<ChangeNotification> {
        self.feed.lock().poll(cursor, limit)
    }

    /// Highest notification cursor assigned so far.
    pub fn latest_sequence(&self) -> u64 {
        self.feed.lock().latest_sequence()
    }

    /// Drops notifications every consumer has already seen.
    pub fn truncate_notifications(&self, before: u64) {
        self.feed.lock().truncate_before(before);
    }

    // ------------------------------------------------------------------
    // Reclamation

    /// Purges expired tombstones and deletes blobs that have sat at zero
    /// references past the configured grace period.
    pub fn reclaim(&self) -> StoreResult<ReclaimReport> {
        let now = now_millis();
        let tombstone_grace = self.config.tombstone_grace.as_millis() as u64;
        let blob_grace = self.config.blob_grace.as_millis() as u64;
        let mut report = ReclaimReport::default();

        let states: Vec<Arc<BucketState>> = self.buckets.read().values().cloned().collect();
        for state in states {
            let mut inner = state.inner.lock();
            let before = inner.records.len();
            inner
                .records
                .retain(|_, r| !(r.deleted && now.saturating_sub(r.updated_at) >= tombstone_grace));
            report.tombstones_purged += before - inner.records.len();
        }

        let expired: Vec<ContentHash> = {
            let refcounts = self.refcounts.lock();
            refcounts
                .iter()
                .filter(|(_, r)| {
                    r.count == 0
                        && r.zero_since
                            .is_some_and(|since| now.saturating_sub(since) >= blob_grace)
                })
                .map(|(hash, _)| *hash)
                .collect()
        };
        for hash in expired {
            self.blobs.delete_blob(&hash)?;
            self.refcounts.lock().remove(&hash);
            report.blobs_deleted += 1;
        }

        if report != ReclaimReport::default() {
            tracing::info!(
                tombstones = report.tombstones_purged,
                blobs = report.blobs_deleted,
                "reclamation pass complete"
            );
        }
        Ok(report)
    }
}

/// Rejects paths that escape the bucket root or are plainly malformed.
fn validate_path(path: &str) -> Result<(), RejectReason> {
    if path.is_empty() {
        return Err(RejectReason::Validation("empty path".into()));
    }
    if path.starts_with('/') {
        return Err(RejectReason::Validation("absolute path".into()));
    }
    if path.split('/').any(|seg| seg == ".." || seg.is_empty()) {
        return Err(RejectReason::Validation(format!(
            "invalid path segment in {path:?}"
        )));
    }
    Ok(())
}
