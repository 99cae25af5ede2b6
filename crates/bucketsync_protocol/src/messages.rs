//! Protocol request/response message pairs.

use crate::operation::ChangeOp;
use bucketsync_core::{AuthProof, BlobEncoding, BucketId, ContentHash, Record, Revision};
use serde::{Deserialize, Serialize};

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Endpoint paths shared by servers and transports. Each carries one
/// CBOR-encoded request and returns one CBOR-encoded response.
pub mod paths {
    /// [`ChallengeRequest`](super::ChallengeRequest) → [`ChallengeResponse`](super::ChallengeResponse).
    pub const CHALLENGE: &str = "/sync/challenge";
    /// [`OfferRequest`](super::OfferRequest) → [`OfferResponse`](super::OfferResponse).
    pub const OFFER: &str = "/sync/offer";
    /// [`BlobUploadRequest`](super::BlobUploadRequest) → [`BlobUploadResponse`](super::BlobUploadResponse).
    pub const UPLOAD: &str = "/sync/upload";
    /// [`ChangeSetRequest`](super::ChangeSetRequest) → [`ChangeSetResponse`](super::ChangeSetResponse).
    pub const COMMIT: &str = "/sync/commit";
    /// [`PullRequest`](super::PullRequest) → [`PullResponse`](super::PullResponse).
    pub const PULL: &str = "/sync/pull";
    /// [`BlobFetchRequest`](super::BlobFetchRequest) → [`BlobFetchResponse`](super::BlobFetchResponse).
    pub const BLOB: &str = "/sync/blob";
}

/// Requests a fresh authentication nonce for a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeRequest {
    /// Protocol version the client speaks; servers reject mismatches
    /// here, before any authenticated traffic.
    pub version: u16,
    /// The bucket the client intends to write to.
    pub bucket_id: BucketId,
}

impl ChallengeRequest {
    /// Creates a request at the current [`PROTOCOL_VERSION`].
    pub fn new(bucket_id: BucketId) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            bucket_id,
        }
    }
}

/// Carries the server-issued, single-use nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    /// Nonce to sign; consumed by the next authenticated request.
    pub nonce: Vec<u8>,
}

/// Offers content hashes ahead of upload (the dedup handshake).
///
/// The server answers which hashes it already holds so that only missing
/// bytes travel, deduplicating both within a bucket and across the whole
/// platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRequest {
    /// Write-authentication proof.
    pub proof: AuthProof,
    /// Candidate hashes the client would upload.
    pub hashes: Vec<ContentHash>,
}

/// Answer to an offer: which blobs the server has and which it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OfferResponse {
    /// Hashes already present server-side; their bytes must not be re-sent.
    pub known: Vec<ContentHash>,
    /// Hashes the server lacks; upload these before committing.
    pub needed: Vec<ContentHash>,
}

/// Uploads one blob payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUploadRequest {
    /// Write-authentication proof.
    pub proof: AuthProof,
    /// Plaintext-derived identity of the payload.
    pub hash: ContentHash,
    /// Payload bytes (possibly encrypted).
    pub bytes: Vec<u8>,
    /// Encoding of the payload at rest.
    pub encoding: BlobEncoding,
}

/// Acknowledges a blob upload. Idempotent: re-uploading a present hash
/// succeeds without rewriting bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobUploadResponse {
    /// Whether the blob is now present.
    pub accepted: bool,
    /// Error message when not accepted.
    pub error: Option<String>,
}

impl BlobUploadResponse {
    /// Creates an accepted response.
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    /// Creates a rejected response.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            error: Some(message.into()),
        }
    }
}

/// A batched change-set, applied atomically against `base_revision`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSetRequest {
    /// Write-authentication proof.
    pub proof: AuthProof,
    /// The bucket revision the client diffed against.
    pub base_revision: Revision,
    /// Last-writer-wins override for stale `base_revision`.
    pub force: bool,
    /// The operations to apply.
    pub ops: Vec<ChangeOp>,
}

/// Why an operation (or a whole batch) was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The batch's `base_revision` is stale; pull, re-diff, resubmit.
    Conflict {
        /// The bucket's current revision.
        current_revision: Revision,
    },
    /// The operation itself is malformed; the rest of the batch continues.
    Validation(String),
    /// A referenced blob is not present server-side.
    MissingBlob(ContentHash),
    /// The proof did not authenticate.
    Auth(String),
}

/// One rejected operation with its reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedOp {
    /// Path of the rejected operation.
    pub path: String,
    /// Why it was rejected.
    pub reason: RejectReason,
}

/// Outcome of a change-set application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSetResponse {
    /// Paths of committed operations.
    pub accepted: Vec<String>,
    /// Operations that were rejected, with reasons.
    pub rejected: Vec<RejectedOp>,
    /// The bucket revision after this batch.
    pub new_revision: Revision,
    /// Hashes the server still needs (from `MissingBlob` rejections).
    pub blobs_needed: Vec<ContentHash>,
}

impl ChangeSetResponse {
    /// Creates a fully-accepted response.
    pub fn accepted(paths: Vec<String>, new_revision: Revision) -> Self {
        Self {
            accepted: paths,
            rejected: Vec::new(),
            new_revision,
            blobs_needed: Vec::new(),
        }
    }

    /// Creates a whole-batch conflict rejection.
    pub fn conflict(paths: impl IntoIterator<Item = String>, current_revision: Revision) -> Self {
        Self {
            accepted: Vec::new(),
            rejected: paths
                .into_iter()
                .map(|path| RejectedOp {
                    path,
                    reason: RejectReason::Conflict { current_revision },
                })
                .collect(),
            new_revision: current_revision,
            blobs_needed: Vec::new(),
        }
    }

    /// Returns true when every op committed.
    pub fn is_fully_accepted(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Returns true when the whole batch was rejected for a stale revision.
    pub fn is_conflict(&self) -> bool {
        self.accepted.is_empty()
            && self
                .rejected
                .iter()
                .all(|r| matches!(r.reason, RejectReason::Conflict { .. }))
            && !self.rejected.is_empty()
    }
}

/// Pulls the authoritative records of a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// The bucket to read.
    pub bucket_id: BucketId,
    /// Return records with `revision > since_revision` (0 for everything).
    pub since_revision: Revision,
}

/// The authoritative records and current revision of a bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    /// Records changed since the requested revision, tombstones included.
    pub records: Vec<Record>,
    /// The bucket's current revision.
    pub revision: Revision,
}

/// Fetches one committed blob by hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobFetchRequest {
    /// The bucket context for the read.
    pub bucket_id: BucketId,
    /// Hash of the blob to fetch.
    pub hash: ContentHash,
}

/// A fetched blob, or absence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobFetchResponse {
    /// Payload bytes when present.
    pub bytes: Option<Vec<u8>>,
    /// Encoding of the payload when present.
    pub encoding: Option<BlobEncoding>,
}
