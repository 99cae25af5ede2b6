//! Request handlers for the sync endpoints.

use crate::auth::NonceStore;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use bucketsync_core::{BucketId, BucketInfo, PublicKey};
use bucketsync_protocol::{
    BlobFetchRequest, BlobFetchResponse, BlobUploadRequest, BlobUploadResponse, ChallengeRequest,
    ChallengeResponse, ChangeNotification, ChangeSetRequest, ChangeSetResponse, OfferRequest,
    OfferResponse, PullRequest, PullResponse, PROTOCOL_VERSION,
};
use bucketsync_store::{RecordStore, StoreError};
use std::sync::Arc;

/// Handles decoded protocol requests against a shared record store.
pub struct SyncHandler {
    config: ServerConfig,
    store: Arc<RecordStore>,
    nonces: NonceStore,
}

impl SyncHandler {
    /// Creates a handler over the given store.
    pub fn new(config: ServerConfig, store: Arc<RecordStore>) -> Self {
        let nonces = NonceStore::new(config.nonce_ttl);
        Self {
            config,
            store,
            nonces,
        }
    }

    /// The shared record store.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Registers a bucket explicitly.
    pub fn register_bucket(
        &self,
        public_key: PublicKey,
        config: Vec<u8>,
        encrypted_private_key: Option<Vec<u8>>,
    ) -> ServerResult<BucketInfo> {
        Ok(self
            .store
            .create_bucket(public_key, config, encrypted_private_key)?)
    }

    /// Verifies a write proof and resolves the target bucket.
    ///
    /// With `auto_create_buckets` enabled, an authenticated proof for an
    /// unregistered bucket registers it under the proof's public key; the
    /// bucket id is derived from that key, so the caller cannot claim a
    /// bucket they do not own.
    fn authenticate(&self, proof: &bucketsync_core::AuthProof) -> ServerResult<BucketId> {
        let bucket_id = self.nonces.verify(proof)?;
        if !self.store.bucket_exists(&bucket_id) {
            if !self.config.auto_create_buckets {
                return Err(ServerError::Store(StoreError::UnknownBucket(bucket_id)));
            }
            match self
                .store
                .create_bucket(proof.public_key, Vec::new(), None)
            {
                Ok(_) | Err(StoreError::BucketExists(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(bucket_id)
    }

    /// Issues a write-authentication nonce.
    ///
    /// The nonce is bound to the requested bucket but issuance does not
    /// prove the bucket exists; unknown buckets fail at the first
    /// authenticated request instead.
    pub fn handle_challenge(&self, request: ChallengeRequest) -> ServerResult<ChallengeResponse> {
        if request.version != PROTOCOL_VERSION {
            return Err(ServerError::ProtocolMismatch(format!(
                "client speaks version {}, server speaks {}",
                request.version, PROTOCOL_VERSION
            )));
        }
        let nonce = self.nonces.issue(request.bucket_id);
        Ok(ChallengeResponse { nonce })
    }

    /// Answers a dedup offer: which blobs exist, which must be uploaded.
    pub fn handle_offer(&self, request: OfferRequest) -> ServerResult<OfferResponse> {
        self.authenticate(&request.proof)?;
        let (known, needed) = self.store.missing_blobs(&request.hashes)?;
        Ok(OfferResponse { known, needed })
    }

    /// Stores one uploaded blob.
    pub fn handle_upload(&self, request: BlobUploadRequest) -> ServerResult<BlobUploadResponse> {
        self.authenticate(&request.proof)?;
        match self
            .store
            .put_blob(&request.hash, &request.bytes, request.encoding)
        {
            Ok(()) => Ok(BlobUploadResponse::accepted()),
            Err(err @ (StoreError::HashMismatch { .. } | StoreError::BlobTooLarge { .. })) => {
                Ok(BlobUploadResponse::rejected(err.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Applies a batched change-set.
    pub fn handle_apply(&self, request: ChangeSetRequest) -> ServerResult<ChangeSetResponse> {
        let bucket_id = self.authenticate(&request.proof)?;
        if request.ops.len() > self.config.max_batch_ops {
            return Err(ServerError::InvalidRequest(format!(
                "too many operations: {} > {}",
                request.ops.len(),
                self.config.max_batch_ops
            )));
        }
        Ok(self.store.apply_change_set(
            &bucket_id,
            request.base_revision,
            request.force,
            &request.ops,
        )?)
    }

    /// Returns records changed since the requested revision.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        let (records, revision) = self
            .store
            .records_since(&request.bucket_id, request.since_revision)?;
        Ok(PullResponse { records, revision })
    }

    /// Fetches one committed blob.
    pub fn handle_fetch_blob(&self, request: BlobFetchRequest) -> ServerResult<BlobFetchResponse> {
        // Holding the bucket id grants read access.
        if !self.store.bucket_exists(&request.bucket_id) {
            return Err(ServerError::Store(StoreError::UnknownBucket(
                request.bucket_id,
            )));
        }
        Ok(match self.store.get_blob(&request.hash)? {
            Some(blob) => BlobFetchResponse {
                bytes: Some(blob.bytes),
                encoding: Some(blob.encoding),
            },
            None => BlobFetchResponse {
                bytes: None,
                encoding: None,
            },
        })
    }

    /// Returns committed-change notifications after `cursor`.
    pub fn poll_notifications(&self, cursor: u64) -> Vec<ChangeNotification> {
        self.store
            .poll_notifications(cursor, self.config.max_poll_batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketsync_core::hash::hash_bytes;
    use bucketsync_core::{BlobEncoding, BucketKeypair};
    use bucketsync_protocol::{ChangeOp, PayloadSource};
    use bucketsync_store::{MemoryBlobStore, StoreConfig};
    use std::collections::BTreeMap;

    fn handler() -> (SyncHandler, BucketKeypair) {
        let store = Arc::new(RecordStore::new(
            Arc::new(MemoryBlobStore::new()),
            StoreConfig::default(),
        ));
        let handler = SyncHandler::new(ServerConfig::default(), store);
        let keypair = BucketKeypair::generate();
        handler
            .register_bucket(keypair.public_key(), Vec::new(), None)
            .unwrap();
        (handler, keypair)
    }

    fn prove(handler: &SyncHandler, keypair: &BucketKeypair) -> bucketsync_core::AuthProof {
        let response = handler
            .handle_challenge(ChallengeRequest::new(keypair.bucket_id()))
            .unwrap();
        keypair.prove(&response.nonce)
    }

    fn inline_put(path: &str, bytes: &[u8]) -> ChangeOp {
        ChangeOp::Put {
            path: path.to_string(),
            content_hash: hash_bytes(bytes),
            size: bytes.len() as u64,
            mtime: 1,
            compiled: BTreeMap::new(),
            payload: PayloadSource::Inline {
                bytes: bytes.to_vec(),
                encoding: BlobEncoding::Raw,
            },
        }
    }

    #[test]
    fn offer_upload_commit_pull() {
        let (handler, keypair) = handler();
        let bytes = b"# hello";
        let hash = hash_bytes(bytes);

        // Offer: the server needs the blob.
        let offer = handler
            .handle_offer(OfferRequest {
                proof: prove(&handler, &keypair),
                hashes: vec![hash],
            })
            .unwrap();
        assert_eq!(offer.needed, vec![hash]);

        // Upload it.
        let upload = handler
            .handle_upload(BlobUploadRequest {
                proof: prove(&handler, &keypair),
                hash,
                bytes: bytes.to_vec(),
                encoding: BlobEncoding::Raw,
            })
            .unwrap();
        assert!(upload.accepted);

        // Commit by reference.
        let response = handler
            .handle_apply(ChangeSetRequest {
                proof: prove(&handler, &keypair),
                base_revision: 0,
                force: false,
                ops: vec![ChangeOp::Put {
                    path: "hello.md".into(),
                    content_hash: hash,
                    size: bytes.len() as u64,
                    mtime: 1,
                    compiled: BTreeMap::new(),
                    payload: PayloadSource::Reference { hash },
                }],
            })
            .unwrap();
        assert!(response.is_fully_accepted());
        assert_eq!(response.new_revision, 1);

        // Pull sees the record.
        let pull = handler
            .handle_pull(PullRequest {
                bucket_id: keypair.bucket_id(),
                since_revision: 0,
            })
            .unwrap();
        assert_eq!(pull.records.len(), 1);
        assert_eq!(pull.records[0].path, "hello.md");

        // And the blob fetches back.
        let fetched = handler
            .handle_fetch_blob(BlobFetchRequest {
                bucket_id: keypair.bucket_id(),
                hash,
            })
            .unwrap();
        assert_eq!(fetched.bytes.as_deref(), Some(bytes.as_slice()));
    }

    #[test]
    fn wrong_protocol_version_rejected_at_challenge() {
        let (handler, keypair) = handler();
        let mut request = ChallengeRequest::new(keypair.bucket_id());
        request.version = PROTOCOL_VERSION + 1;
        assert!(matches!(
            handler.handle_challenge(request),
            Err(ServerError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn each_proof_needs_a_fresh_nonce() {
        let (handler, keypair) = handler();
        let proof = prove(&handler, &keypair);

        handler
            .handle_offer(OfferRequest {
                proof: proof.clone(),
                hashes: vec![],
            })
            .unwrap();
        // Replaying the same proof fails.
        assert!(matches!(
            handler.handle_offer(OfferRequest {
                proof,
                hashes: vec![],
            }),
            Err(ServerError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn unregistered_bucket_rejected_for_writes() {
        let (handler, _) = handler();
        let stranger = BucketKeypair::generate();
        let proof = prove(&handler, &stranger);
        assert!(matches!(
            handler.handle_offer(OfferRequest {
                proof,
                hashes: vec![],
            }),
            Err(ServerError::Store(StoreError::UnknownBucket(_)))
        ));
    }

    #[test]
    fn auto_create_registers_on_first_write() {
        let store = Arc::new(RecordStore::new(
            Arc::new(MemoryBlobStore::new()),
            StoreConfig::default(),
        ));
        let handler = SyncHandler::new(
            ServerConfig::default().with_auto_create_buckets(true),
            store,
        );
        let keypair = BucketKeypair::generate();

        let response = handler
            .handle_apply(ChangeSetRequest {
                proof: prove(&handler, &keypair),
                base_revision: 0,
                force: false,
                ops: vec![inline_put("a.md", b"first")],
            })
            .unwrap();
        assert!(response.is_fully_accepted());
        assert!(handler.store().bucket_exists(&keypair.bucket_id()));
    }

    #[test]
    fn oversized_batch_rejected() {
        let store = Arc::new(RecordStore::new(
            Arc::new(MemoryBlobStore::new()),
            StoreConfig::default(),
        ));
        let handler = SyncHandler::new(ServerConfig::default().with_max_batch_ops(1), store);
        let keypair = BucketKeypair::generate();
        handler
            .register_bucket(keypair.public_key(), Vec::new(), None)
            .unwrap();

        let result = handler.handle_apply(ChangeSetRequest {
            proof: prove(&handler, &keypair),
            base_revision: 0,
            force: false,
            ops: vec![inline_put("a.md", b"a"), inline_put("b.md", b"b")],
        });
        assert!(matches!(result, Err(ServerError::InvalidRequest(_))));
    }

    #[test]
    fn bad_upload_is_rejected_not_fatal() {
        let (handler, keypair) = handler();
        let response = handler
            .handle_upload(BlobUploadRequest {
                proof: prove(&handler, &keypair),
                hash: hash_bytes(b"claimed"),
                bytes: b"other".to_vec(),
                encoding: BlobEncoding::Raw,
            })
            .unwrap();
        assert!(!response.accepted);
        assert!(response.error.is_some());
    }

    #[test]
    fn notifications_flow_after_commit() {
        let (handler, keypair) = handler();
        handler
            .handle_apply(ChangeSetRequest {
                proof: prove(&handler, &keypair),
                base_revision: 0,
                force: false,
                ops: vec![inline_put("a.md", b"a")],
            })
            .unwrap();

        let events = handler.poll_notifications(0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bucket_id, keypair.bucket_id());
    }
}
