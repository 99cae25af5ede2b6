//! The sync engine state machine.
//!
//! One engine owns one sync root and one bucket keypair. A cycle walks
//! the phases scan → diff → compile → upload → commit; between commit
//! attempts the engine recovers from revision conflicts by pulling the
//! authoritative records, rebasing the manifest, and re-diffing, so a
//! conflicted cycle converges instead of failing outright.

use crate::config::SyncConfig;
use crate::diff::{diff, LocalChange};
use crate::error::{ClientError, ClientResult};
use crate::manifest::Manifest;
use crate::scanner::{scan, ScannedFile};
use crate::transport::SyncTransport;
use bucketsync_core::hash::ContentHash;
use bucketsync_core::{
    compile, now_millis, AuthProof, BlobCipher, BlobEncoding, BucketId, BucketKeypair,
    BucketSecret, CompileFailure, ManifestEntry, Revision,
};
use bucketsync_protocol::{
    BlobUploadRequest, ChallengeRequest, ChangeOp, ChangeSetRequest, OfferRequest, PayloadSource,
    PullRequest, PullResponse, RejectedOp,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The current phase of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not syncing.
    Idle,
    /// Walking the sync root.
    Scanning,
    /// Comparing the scan against the manifest.
    Diffing,
    /// Deriving compiled artifacts.
    Compiling,
    /// Offering and uploading blobs.
    Uploading,
    /// Committing change-sets.
    Committing,
    /// Waiting before a retry.
    RetryWait,
    /// The last cycle failed.
    Failed,
}

impl SyncPhase {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Scanning
                | SyncPhase::Diffing
                | SyncPhase::Compiling
                | SyncPhase::Uploading
                | SyncPhase::Committing
        )
    }

    /// Returns true if a new cycle can start.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }
}

/// Cumulative statistics across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed sync cycles.
    pub cycles_completed: u64,
    /// Files seen by the scanner, cumulative.
    pub files_scanned: u64,
    /// Blobs uploaded (after dedup), cumulative.
    pub blobs_uploaded: u64,
    /// Operations committed, cumulative.
    pub ops_committed: u64,
    /// Revision conflicts recovered by pull-and-rebase.
    pub conflicts_recovered: u64,
    /// Compile failures recorded, cumulative.
    pub compile_failures: u64,
    /// Cycle retries.
    pub retries: u64,
    /// When the last successful cycle finished.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Paths committed this cycle.
    pub committed: Vec<String>,
    /// Operations the server rejected, with reasons.
    pub rejected: Vec<RejectedOp>,
    /// Blobs uploaded this cycle (after dedup).
    pub blobs_uploaded: usize,
    /// Per-path compile failures; retried next cycle.
    pub compile_failures: Vec<(String, CompileFailure)>,
    /// The bucket revision after the cycle.
    pub revision: Revision,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

/// A prepared put: the scanned file plus its compiled hashes.
struct PendingPut {
    file: ScannedFile,
    compiled: BTreeMap<String, ContentHash>,
}

/// The sync engine for one root and one bucket.
pub struct SyncEngine<T: SyncTransport> {
    root: PathBuf,
    keypair: BucketKeypair,
    config: SyncConfig,
    transport: Arc<T>,
    cipher: Option<BlobCipher>,
    phase: RwLock<SyncPhase>,
    stats: RwLock<SyncStats>,
    /// Paths whose compile failed last cycle; re-included in the next
    /// diff even when their content hash is unchanged.
    retry_paths: Mutex<BTreeSet<String>>,
    cancelled: AtomicBool,
}

impl<T: SyncTransport> SyncEngine<T> {
    /// Creates an engine for `root`, writing as the bucket owned by
    /// `keypair`.
    pub fn new(
        root: impl Into<PathBuf>,
        keypair: BucketKeypair,
        config: SyncConfig,
        transport: T,
    ) -> ClientResult<Self> {
        let cipher = if config.encrypt {
            Some(BlobCipher::new(&BucketSecret::derive(&keypair)?))
        } else {
            None
        };
        Ok(Self {
            root: root.into(),
            keypair,
            config,
            transport: Arc::new(transport),
            cipher,
            phase: RwLock::new(SyncPhase::Idle),
            stats: RwLock::new(SyncStats::default()),
            retry_paths: Mutex::new(BTreeSet::new()),
            cancelled: AtomicBool::new(false),
        })
    }

    /// The bucket this engine writes to.
    pub fn bucket_id(&self) -> BucketId {
        self.keypair.bucket_id()
    }

    /// The current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// A snapshot of the cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cancels an ongoing cycle from another thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> ClientResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(ClientError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    /// Claims the engine for a new cycle. The check and the transition
    /// happen under one write lock so two callers cannot both pass.
    fn begin_cycle(&self) -> ClientResult<()> {
        let mut phase = self.phase.write();
        if !phase.can_start() {
            return Err(ClientError::AlreadySyncing {
                phase: format!("{:?}", *phase),
            });
        }
        *phase = SyncPhase::Scanning;
        Ok(())
    }

    /// Obtains a fresh write proof. Nonces are single-use, so every
    /// authenticated request needs its own.
    fn prove(&self) -> ClientResult<AuthProof> {
        let response = self
            .transport
            .challenge(&ChallengeRequest::new(self.bucket_id()))?;
        Ok(self.keypair.prove(&response.nonce))
    }

    /// Pulls authoritative records since `since_revision`.
    pub fn pull_records(&self, since_revision: Revision) -> ClientResult<PullResponse> {
        self.transport.pull(&PullRequest {
            bucket_id: self.bucket_id(),
            since_revision,
        })
    }

    /// Runs one sync cycle.
    pub fn sync(&self) -> ClientResult<SyncReport> {
        let start = Instant::now();
        self.begin_cycle()?;
        self.reset_cancel();

        match self.run_cycle(start) {
            Ok(report) => {
                self.set_phase(SyncPhase::Idle);
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.blobs_uploaded += report.blobs_uploaded as u64;
                stats.ops_committed += report.committed.len() as u64;
                stats.compile_failures += report.compile_failures.len() as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                Ok(report)
            }
            Err(err) => {
                self.set_phase(SyncPhase::Failed);
                self.stats.write().last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Runs sync cycles with retry on transient errors.
    pub fn sync_with_retry(&self) -> ClientResult<SyncReport> {
        let retry = self.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                self.set_phase(SyncPhase::RetryWait);
                std::thread::sleep(retry.wait_before(attempt));
                self.stats.write().retries += 1;
            }
            self.check_cancelled()?;

            match self.sync() {
                Ok(report) => return Ok(report),
                Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                    tracing::warn!(%err, attempt, "sync failed, will retry");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| ClientError::Protocol("no sync attempts made".into())))
    }

    fn run_cycle(&self, start: Instant) -> ClientResult<SyncReport> {
        // Scan.
        self.set_phase(SyncPhase::Scanning);
        let mut manifest = Manifest::load(&self.root);
        let scanned = scan(&self.root, &manifest)?;
        self.stats.write().files_scanned += scanned.len() as u64;
        self.check_cancelled()?;

        // Diff.
        self.set_phase(SyncPhase::Diffing);
        let mut changes = diff(&scanned, &manifest);
        self.include_retry_paths(&scanned, &mut changes);
        if changes.is_empty() {
            tracing::debug!(bucket = %self.bucket_id(), "nothing to sync");
            return Ok(SyncReport {
                committed: Vec::new(),
                rejected: Vec::new(),
                blobs_uploaded: 0,
                compile_failures: Vec::new(),
                revision: manifest.revision,
                duration: start.elapsed(),
            });
        }
        self.check_cancelled()?;

        // Compile.
        self.set_phase(SyncPhase::Compiling);
        let mut puts: BTreeMap<String, PendingPut> = BTreeMap::new();
        let mut deletes: Vec<String> = Vec::new();
        let mut payloads: BTreeMap<ContentHash, (Vec<u8>, BlobEncoding)> = BTreeMap::new();
        let mut compile_failures = Vec::new();

        for change in changes {
            match change {
                LocalChange::Delete { path } => deletes.push(path),
                LocalChange::Upsert(file) => {
                    let raw = match std::fs::read(&file.abs_path) {
                        Ok(raw) => raw,
                        Err(err) => {
                            // The file vanished between scan and read;
                            // the next cycle picks it up as a delete.
                            tracing::warn!(path = %file.path, %err, "skipping unreadable file");
                            continue;
                        }
                    };
                    let outcome = compile(file.abs_path.as_path(), &raw, &self.config.compile);
                    for failure in &outcome.failures {
                        compile_failures.push((file.path.clone(), failure.clone()));
                    }
                    for artifact in outcome.artifacts.values() {
                        payloads.insert(
                            artifact.hash,
                            (artifact.bytes.clone(), BlobEncoding::Compiled),
                        );
                    }
                    payloads.insert(file.hash, (raw, BlobEncoding::Raw));
                    puts.insert(
                        file.path.clone(),
                        PendingPut {
                            compiled: outcome.compiled_hashes(),
                            file,
                        },
                    );
                }
            }
        }
        self.check_cancelled()?;

        // Offer and upload.
        self.set_phase(SyncPhase::Uploading);
        let blobs_uploaded = self.upload_payloads(&payloads)?;

        // Commit, recovering from conflicts by pull-and-rebase.
        self.set_phase(SyncPhase::Committing);
        let (committed, rejected) = self.commit_changes(&mut manifest, &puts, &deletes)?;
        self.remember_retry_paths(&compile_failures, &rejected);

        tracing::info!(
            bucket = %self.bucket_id(),
            committed = committed.len(),
            rejected = rejected.len(),
            uploaded = blobs_uploaded,
            revision = manifest.revision,
            "sync cycle complete"
        );

        Ok(SyncReport {
            committed,
            rejected,
            blobs_uploaded,
            compile_failures,
            revision: manifest.revision,
            duration: start.elapsed(),
        })
    }

    /// Re-includes paths whose compile failed last cycle, so transient
    /// failures are retried without a content change. The set itself is
    /// left untouched until the cycle completes, so an aborted cycle
    /// does not lose queued paths.
    fn include_retry_paths(&self, scanned: &[ScannedFile], changes: &mut Vec<LocalChange>) {
        let retry = self.retry_paths.lock().clone();
        for path in retry {
            if changes.iter().any(|c| c.path() == path) {
                continue;
            }
            if let Some(file) = scanned.iter().find(|f| f.path == path) {
                changes.push(LocalChange::Upsert(file.clone()));
            }
        }
    }

    /// Replaces the carry-over set with this cycle's leftovers. Called
    /// only once a cycle has run to completion.
    fn remember_retry_paths(
        &self,
        compile_failures: &[(String, CompileFailure)],
        rejected: &[RejectedOp],
    ) {
        let mut retry: BTreeSet<String> = compile_failures
            .iter()
            .map(|(path, _)| path.clone())
            .collect();
        retry.extend(rejected.iter().map(|op| op.path.clone()));
        *self.retry_paths.lock() = retry;
    }

    /// Offers all payload hashes and uploads the ones the server lacks.
    ///
    /// With encryption enabled, bytes are encrypted here, after the
    /// plaintext hash was computed; the offer still speaks plaintext
    /// hashes, so dedup keeps working per bucket secret.
    fn upload_payloads(
        &self,
        payloads: &BTreeMap<ContentHash, (Vec<u8>, BlobEncoding)>,
    ) -> ClientResult<usize> {
        if payloads.is_empty() {
            return Ok(0);
        }

        let hashes: Vec<ContentHash> = payloads.keys().copied().collect();
        let offer = self.transport.offer(&OfferRequest {
            proof: self.prove()?,
            hashes,
        })?;

        let mut uploaded = 0usize;
        for hash in offer.needed {
            self.check_cancelled()?;
            let Some((bytes, encoding)) = payloads.get(&hash) else {
                continue;
            };
            let (bytes, encoding) = match &self.cipher {
                Some(cipher) => (cipher.encrypt(bytes)?, BlobEncoding::Encrypted),
                None => (bytes.clone(), *encoding),
            };

            let response = self.transport.upload(&BlobUploadRequest {
                proof: self.prove()?,
                hash,
                bytes,
                encoding,
            })?;
            if !response.accepted {
                return Err(ClientError::ServerError(
                    response.error.unwrap_or_else(|| "upload rejected".into()),
                ));
            }
            uploaded += 1;
        }
        tracing::debug!(offered = payloads.len(), uploaded, "blob upload complete");
        Ok(uploaded)
    }

    fn build_ops(&self, puts: &BTreeMap<String, PendingPut>, deletes: &[String]) -> Vec<ChangeOp> {
        let mut ops: Vec<ChangeOp> = puts
            .values()
            .map(|put| ChangeOp::Put {
                path: put.file.path.clone(),
                content_hash: put.file.hash,
                size: put.file.size,
                mtime: put.file.mtime,
                compiled: put.compiled.clone(),
                payload: PayloadSource::Reference {
                    hash: put.file.hash,
                },
            })
            .collect();
        ops.extend(deletes.iter().map(|path| ChangeOp::Delete {
            path: path.clone(),
        }));
        ops
    }

    /// Commits all pending operations in batches, applying accepted
    /// results to the manifest as it goes.
    fn commit_changes(
        &self,
        manifest: &mut Manifest,
        puts: &BTreeMap<String, PendingPut>,
        deletes: &[String],
    ) -> ClientResult<(Vec<String>, Vec<RejectedOp>)> {
        let mut committed = Vec::new();
        let mut rejected = Vec::new();

        let ops = self.build_ops(puts, deletes);
        for batch in ops.chunks(self.config.batch_size.max(1)) {
            self.check_cancelled()?;
            let mut batch: Vec<ChangeOp> = batch.to_vec();
            let mut recovered = false;

            loop {
                let response = self.transport.commit(&ChangeSetRequest {
                    proof: self.prove()?,
                    base_revision: manifest.revision,
                    force: false,
                    ops: batch.clone(),
                })?;

                if response.is_conflict() {
                    if recovered {
                        return Err(ClientError::Conflict {
                            current_revision: response.new_revision,
                        });
                    }
                    tracing::debug!(
                        bucket = %self.bucket_id(),
                        current = response.new_revision,
                        "commit conflict, rebasing onto server state"
                    );
                    batch = self.rebase(manifest, batch)?;
                    self.stats.write().conflicts_recovered += 1;
                    recovered = true;
                    if batch.is_empty() {
                        manifest.save(&self.root)?;
                        break;
                    }
                    continue;
                }

                manifest.revision = response.new_revision;
                for path in &response.accepted {
                    self.apply_accepted(manifest, path, puts);
                }
                committed.extend(response.accepted);
                rejected.extend(response.rejected);
                // Persist each accepted batch as it lands, so a failure
                // later in the cycle does not resubmit what the server
                // already holds.
                manifest.save(&self.root)?;
                break;
            }
        }

        Ok((committed, rejected))
    }

    /// Pulls the authoritative records, folds them into the manifest,
    /// and drops batch ops the server has already seen.
    fn rebase(&self, manifest: &mut Manifest, batch: Vec<ChangeOp>) -> ClientResult<Vec<ChangeOp>> {
        let pull = self.pull_records(manifest.revision)?;
        let now = now_millis();
        for record in &pull.records {
            if record.deleted {
                manifest.remove(&record.path);
            } else {
                manifest.upsert(ManifestEntry {
                    path: record.path.clone(),
                    content_hash: record.content_hash,
                    size: record.size,
                    mtime: record.mtime,
                    compiled: record.compiled.clone(),
                    revision: record.revision,
                    synced_at: now,
                });
            }
        }
        manifest.revision = pull.revision;

        // Keep only ops that still change something after the rebase.
        let batch = batch
            .into_iter()
            .filter(|op| match op {
                ChangeOp::Put {
                    path,
                    content_hash,
                    compiled,
                    ..
                } => manifest
                    .entry(path)
                    .map(|e| e.content_hash != *content_hash || e.compiled != *compiled)
                    .unwrap_or(true),
                ChangeOp::Delete { path } => manifest.entry(path).is_some(),
            })
            .collect();
        Ok(batch)
    }

    fn apply_accepted(&self, manifest: &mut Manifest, path: &str, puts: &BTreeMap<String, PendingPut>) {
        if let Some(put) = puts.get(path) {
            manifest.upsert(ManifestEntry {
                path: put.file.path.clone(),
                content_hash: put.file.hash,
                size: put.file.size,
                mtime: put.file.mtime,
                compiled: put.compiled.clone(),
                revision: manifest.revision,
                synced_at: now_millis(),
            });
        } else {
            manifest.remove(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use bucketsync_protocol::{
        BlobUploadResponse, ChallengeResponse, ChangeSetResponse, OfferResponse,
    };
    use std::fs;
    use tempfile::TempDir;

    fn engine_with(dir: &TempDir, transport: MockTransport) -> SyncEngine<MockTransport> {
        SyncEngine::new(
            dir.path(),
            BucketKeypair::generate(),
            SyncConfig::new("loopback://"),
            transport,
        )
        .unwrap()
    }

    fn script_happy_path(transport: &MockTransport) {
        transport.set_challenge_response(ChallengeResponse {
            nonce: vec![1; 32],
        });
        transport.set_upload_response(BlobUploadResponse::accepted());
    }

    #[test]
    fn initial_state() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(&dir, MockTransport::new());
        assert_eq!(engine.phase(), SyncPhase::Idle);
        assert_eq!(engine.stats().cycles_completed, 0);
    }

    #[test]
    fn empty_root_commits_nothing() {
        let dir = TempDir::new().unwrap();
        // No commit response scripted: the engine must not reach commit.
        let engine = engine_with(&dir, MockTransport::new());

        let report = engine.sync().unwrap();
        assert!(report.committed.is_empty());
        assert_eq!(report.blobs_uploaded, 0);
        assert_eq!(report.revision, 0);
        assert_eq!(engine.phase(), SyncPhase::Idle);
        assert_eq!(engine.stats().cycles_completed, 1);
    }

    #[test]
    fn full_cycle_updates_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("note.txt"), b"hello").unwrap();

        let transport = MockTransport::new();
        script_happy_path(&transport);
        transport.set_offer_response(OfferResponse {
            known: vec![],
            needed: vec![bucketsync_core::hash::hash_bytes(b"hello")],
        });
        transport.push_commit_response(ChangeSetResponse::accepted(vec!["note.txt".into()], 1));

        let engine = engine_with(&dir, transport);
        let report = engine.sync().unwrap();

        assert_eq!(report.committed, vec!["note.txt".to_string()]);
        assert_eq!(report.blobs_uploaded, 1);
        assert_eq!(report.revision, 1);

        let manifest = Manifest::load(dir.path());
        assert_eq!(manifest.revision, 1);
        let entry = manifest.entry("note.txt").unwrap();
        assert_eq!(
            entry.content_hash,
            bucketsync_core::hash::hash_bytes(b"hello")
        );
    }

    #[test]
    fn second_cycle_with_no_edits_is_a_noop() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("note.txt"), b"hello").unwrap();

        let transport = MockTransport::new();
        script_happy_path(&transport);
        transport.set_offer_response(OfferResponse {
            known: vec![],
            needed: vec![bucketsync_core::hash::hash_bytes(b"hello")],
        });
        // Exactly one commit response: a second commit would error.
        transport.push_commit_response(ChangeSetResponse::accepted(vec!["note.txt".into()], 1));

        let engine = engine_with(&dir, transport);
        engine.sync().unwrap();
        let report = engine.sync().unwrap();
        assert!(report.committed.is_empty());
        assert_eq!(report.revision, 1);
    }

    #[test]
    fn conflict_recovers_by_rebasing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("note.txt"), b"local edit").unwrap();

        let transport = MockTransport::new();
        script_happy_path(&transport);
        transport.set_offer_response(OfferResponse {
            known: vec![bucketsync_core::hash::hash_bytes(b"local edit")],
            needed: vec![],
        });
        // First commit conflicts; pull shows the server at revision 2
        // with unrelated records; the resubmit is accepted.
        transport.push_commit_response(ChangeSetResponse::conflict(
            vec!["note.txt".to_string()],
            2,
        ));
        transport.set_pull_response(PullResponse {
            records: vec![],
            revision: 2,
        });
        transport.push_commit_response(ChangeSetResponse::accepted(vec!["note.txt".into()], 3));

        let engine = engine_with(&dir, transport);
        let report = engine.sync().unwrap();

        assert_eq!(report.committed, vec!["note.txt".to_string()]);
        assert_eq!(report.revision, 3);
        assert_eq!(engine.stats().conflicts_recovered, 1);
        assert_eq!(Manifest::load(dir.path()).revision, 3);
    }

    #[test]
    fn rejected_op_is_retried_next_cycle() {
        use bucketsync_protocol::RejectReason;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.txt"), b"fine").unwrap();
        fs::write(dir.path().join("bad.txt"), b"flaky").unwrap();

        let transport = MockTransport::new();
        script_happy_path(&transport);
        transport.set_offer_response(OfferResponse {
            known: vec![
                bucketsync_core::hash::hash_bytes(b"fine"),
                bucketsync_core::hash::hash_bytes(b"flaky"),
            ],
            needed: vec![],
        });
        transport.push_commit_response(ChangeSetResponse {
            accepted: vec!["good.txt".into()],
            rejected: vec![RejectedOp {
                path: "bad.txt".into(),
                reason: RejectReason::Validation("transient".into()),
            }],
            new_revision: 1,
            blobs_needed: vec![],
        });
        // The second cycle resubmits exactly the rejected path.
        transport.push_commit_response(ChangeSetResponse::accepted(vec!["bad.txt".into()], 2));

        let engine = engine_with(&dir, transport);
        let report = engine.sync().unwrap();
        assert_eq!(report.committed, vec!["good.txt".to_string()]);
        assert_eq!(report.rejected.len(), 1);

        let report = engine.sync().unwrap();
        assert_eq!(report.committed, vec!["bad.txt".to_string()]);
        assert_eq!(report.revision, 2);
        assert!(Manifest::load(dir.path()).entry("bad.txt").is_some());
    }

    #[test]
    fn persistent_conflict_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("note.txt"), b"x").unwrap();

        let transport = MockTransport::new();
        script_happy_path(&transport);
        transport.set_offer_response(OfferResponse {
            known: vec![bucketsync_core::hash::hash_bytes(b"x")],
            needed: vec![],
        });
        transport.push_commit_response(ChangeSetResponse::conflict(vec!["note.txt".to_string()], 2));
        transport.set_pull_response(PullResponse {
            records: vec![],
            revision: 2,
        });
        transport.push_commit_response(ChangeSetResponse::conflict(vec!["note.txt".to_string()], 4));

        let engine = engine_with(&dir, transport);
        let err = engine.sync().unwrap_err();
        assert!(matches!(err, ClientError::Conflict { current_revision: 4 }));
        assert_eq!(engine.phase(), SyncPhase::Failed);
    }

    #[test]
    fn cancel_flag_roundtrip() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(&dir, MockTransport::new());

        engine.cancel();
        assert!(matches!(
            engine.check_cancelled(),
            Err(ClientError::Cancelled)
        ));
        engine.reset_cancel();
        assert!(engine.check_cancelled().is_ok());
    }

    #[test]
    fn phase_transitions() {
        assert!(SyncPhase::Idle.can_start());
        assert!(SyncPhase::Failed.can_start());
        // Waiting out a backoff must not block the retry itself.
        assert!(SyncPhase::RetryWait.can_start());
        assert!(!SyncPhase::Uploading.can_start());
        assert!(SyncPhase::Scanning.is_active());
        assert!(!SyncPhase::RetryWait.is_active());
    }

    #[test]
    fn transient_failure_is_retried_until_success() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("note.txt"), b"hello").unwrap();

        let transport = MockTransport::new();
        script_happy_path(&transport);
        transport.set_offer_response(OfferResponse {
            known: vec![bucketsync_core::hash::hash_bytes(b"hello")],
            needed: vec![],
        });
        transport.fail_commits(1);
        transport.push_commit_response(ChangeSetResponse::accepted(vec!["note.txt".into()], 1));

        let config = SyncConfig::new("loopback://").with_retry(
            crate::config::RetryConfig::new(3).with_base_wait(Duration::from_millis(1)),
        );
        let engine = SyncEngine::new(dir.path(), BucketKeypair::generate(), config, transport)
            .unwrap();

        let report = engine.sync_with_retry().unwrap();
        assert_eq!(report.committed, vec!["note.txt".to_string()]);
        assert_eq!(engine.stats().retries, 1);
        assert_eq!(engine.phase(), SyncPhase::Idle);
    }

    #[test]
    fn auth_failure_is_not_retried() {
        struct DeniedTransport;
        impl SyncTransport for DeniedTransport {
            fn challenge(
                &self,
                _request: &ChallengeRequest,
            ) -> ClientResult<bucketsync_protocol::ChallengeResponse> {
                Err(ClientError::AuthenticationFailed("unknown bucket".into()))
            }
            fn offer(
                &self,
                _request: &OfferRequest,
            ) -> ClientResult<bucketsync_protocol::OfferResponse> {
                unreachable!("offer requires a proof")
            }
            fn upload(
                &self,
                _request: &BlobUploadRequest,
            ) -> ClientResult<BlobUploadResponse> {
                unreachable!("upload requires a proof")
            }
            fn commit(
                &self,
                _request: &ChangeSetRequest,
            ) -> ClientResult<ChangeSetResponse> {
                unreachable!("commit requires a proof")
            }
            fn pull(&self, _request: &PullRequest) -> ClientResult<PullResponse> {
                unreachable!("pull is only used for conflict recovery")
            }
            fn fetch_blob(
                &self,
                _request: &bucketsync_protocol::BlobFetchRequest,
            ) -> ClientResult<bucketsync_protocol::BlobFetchResponse> {
                unreachable!("the engine never fetches blobs")
            }
        }

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("note.txt"), b"hello").unwrap();

        let config = SyncConfig::new("loopback://")
            .with_retry(crate::config::RetryConfig::new(5));
        let engine =
            SyncEngine::new(dir.path(), BucketKeypair::generate(), config, DeniedTransport)
                .unwrap();

        let err = engine.sync_with_retry().unwrap_err();
        assert!(matches!(err, ClientError::AuthenticationFailed(_)));
        // One attempt, no retries: the proof will not get better.
        assert_eq!(engine.stats().retries, 0);
    }

    #[test]
    fn failed_cycle_keeps_retry_queue() {
        let dir = TempDir::new().unwrap();
        // Invalid utf-8 markdown: the raw bytes commit, both compiled
        // variants fail, and the path enters the retry queue.
        let raw = [0xFF, 0xFE, 0x41];
        fs::write(dir.path().join("broken.md"), raw).unwrap();

        let transport = MockTransport::new();
        script_happy_path(&transport);
        transport.set_offer_response(OfferResponse {
            known: vec![bucketsync_core::hash::hash_bytes(&raw)],
            needed: vec![],
        });
        transport.push_commit_response(ChangeSetResponse::accepted(vec!["broken.md".into()], 1));

        let engine = engine_with(&dir, transport);
        let report = engine.sync().unwrap();
        assert_eq!(report.compile_failures.len(), 2);

        // The next cycle dies on the network; the queued path must
        // survive the aborted cycle.
        engine.transport.fail_commits(1);
        engine.sync().unwrap_err();

        engine
            .transport
            .push_commit_response(ChangeSetResponse::accepted(vec!["broken.md".into()], 2));
        let report = engine.sync().unwrap();
        assert_eq!(report.committed, vec!["broken.md".to_string()]);
    }

    #[test]
    fn concurrent_sync_is_refused() {
        use parking_lot::Condvar;

        struct GatedTransport {
            inner: MockTransport,
            gate: (parking_lot::Mutex<bool>, Condvar),
        }
        impl GatedTransport {
            fn release(&self) {
                *self.gate.0.lock() = true;
                self.gate.1.notify_all();
            }
        }
        impl SyncTransport for GatedTransport {
            fn challenge(
                &self,
                request: &ChallengeRequest,
            ) -> ClientResult<bucketsync_protocol::ChallengeResponse> {
                let mut open = self.gate.0.lock();
                while !*open {
                    self.gate.1.wait(&mut open);
                }
                self.inner.challenge(request)
            }
            fn offer(
                &self,
                request: &OfferRequest,
            ) -> ClientResult<bucketsync_protocol::OfferResponse> {
                self.inner.offer(request)
            }
            fn upload(&self, request: &BlobUploadRequest) -> ClientResult<BlobUploadResponse> {
                self.inner.upload(request)
            }
            fn commit(&self, request: &ChangeSetRequest) -> ClientResult<ChangeSetResponse> {
                self.inner.commit(request)
            }
            fn pull(&self, request: &PullRequest) -> ClientResult<PullResponse> {
                self.inner.pull(request)
            }
            fn fetch_blob(
                &self,
                request: &bucketsync_protocol::BlobFetchRequest,
            ) -> ClientResult<bucketsync_protocol::BlobFetchResponse> {
                self.inner.fetch_blob(request)
            }
        }

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("note.txt"), b"hello").unwrap();

        let inner = MockTransport::new();
        script_happy_path(&inner);
        inner.set_offer_response(OfferResponse {
            known: vec![bucketsync_core::hash::hash_bytes(b"hello")],
            needed: vec![],
        });
        inner.push_commit_response(ChangeSetResponse::accepted(vec!["note.txt".into()], 1));

        let transport = GatedTransport {
            inner,
            gate: (parking_lot::Mutex::new(false), Condvar::new()),
        };
        let engine = SyncEngine::new(
            dir.path(),
            BucketKeypair::generate(),
            SyncConfig::new("loopback://"),
            transport,
        )
        .unwrap();

        std::thread::scope(|scope| {
            let first = scope.spawn(|| engine.sync());

            // Wait for the first cycle to claim the engine.
            while !engine.phase().is_active() {
                std::thread::sleep(Duration::from_millis(1));
            }
            let err = engine.sync().unwrap_err();
            assert!(matches!(err, ClientError::AlreadySyncing { .. }));

            engine.transport.release();
            assert!(first.join().unwrap().is_ok());
        });
    }
}
