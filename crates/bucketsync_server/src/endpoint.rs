//! The embeddable sync endpoint.
//!
//! [`SyncEndpoint`] dispatches CBOR request bodies by path, one request
//! per call. It owns no listener: embed it behind whatever HTTP server
//! or message bus the deployment uses, or call [`dispatch`] directly for
//! in-process loopback (the client integration tests do exactly that).
//!
//! [`dispatch`]: SyncEndpoint::dispatch

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::SyncHandler;
use bucketsync_core::{BucketInfo, PublicKey};
use bucketsync_protocol::{
    from_cbor, paths, to_cbor, BlobFetchRequest, BlobUploadRequest, ChallengeRequest,
    ChangeNotification, ChangeSetRequest, OfferRequest, PullRequest,
};
use bucketsync_store::{ReclaimReport, RecordStore};
use std::sync::Arc;

/// A path-dispatched sync server over a shared record store.
pub struct SyncEndpoint {
    handler: SyncHandler,
}

impl SyncEndpoint {
    /// Creates an endpoint over the given store.
    pub fn new(config: ServerConfig, store: Arc<RecordStore>) -> Self {
        Self {
            handler: SyncHandler::new(config, store),
        }
    }

    /// The underlying handler, for embedding call sites that already
    /// hold decoded requests.
    pub fn handler(&self) -> &SyncHandler {
        &self.handler
    }

    /// Registers a bucket explicitly.
    pub fn register_bucket(
        &self,
        public_key: PublicKey,
        config: Vec<u8>,
        encrypted_private_key: Option<Vec<u8>>,
    ) -> ServerResult<BucketInfo> {
        self.handler
            .register_bucket(public_key, config, encrypted_private_key)
    }

    /// Decodes `body`, routes it to the handler for `path`, and encodes
    /// the response.
    pub fn dispatch(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        tracing::trace!(path, bytes = body.len(), "dispatching request");
        match path {
            paths::CHALLENGE => {
                let request: ChallengeRequest = from_cbor(body)?;
                Ok(to_cbor(&self.handler.handle_challenge(request)?)?)
            }
            paths::OFFER => {
                let request: OfferRequest = from_cbor(body)?;
                Ok(to_cbor(&self.handler.handle_offer(request)?)?)
            }
            paths::UPLOAD => {
                let request: BlobUploadRequest = from_cbor(body)?;
                Ok(to_cbor(&self.handler.handle_upload(request)?)?)
            }
            paths::COMMIT => {
                let request: ChangeSetRequest = from_cbor(body)?;
                Ok(to_cbor(&self.handler.handle_apply(request)?)?)
            }
            paths::PULL => {
                let request: PullRequest = from_cbor(body)?;
                Ok(to_cbor(&self.handler.handle_pull(request)?)?)
            }
            paths::BLOB => {
                let request: BlobFetchRequest = from_cbor(body)?;
                Ok(to_cbor(&self.handler.handle_fetch_blob(request)?)?)
            }
            other => Err(ServerError::UnknownEndpoint(other.to_string())),
        }
    }

    /// Returns committed-change notifications after `cursor`.
    pub fn poll_notifications(&self, cursor: u64) -> Vec<ChangeNotification> {
        self.handler.poll_notifications(cursor)
    }

    /// Runs one reclamation pass over the store.
    pub fn reclaim(&self) -> ServerResult<ReclaimReport> {
        Ok(self.handler.store().reclaim()?)
    }
}
