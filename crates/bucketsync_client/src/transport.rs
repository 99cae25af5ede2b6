//! Transport layer abstraction for sync operations.

use crate::error::{ClientError, ClientResult};
use bucketsync_protocol::{
    BlobFetchRequest, BlobFetchResponse, BlobUploadRequest, BlobUploadResponse, ChallengeRequest,
    ChallengeResponse, ChangeSetRequest, ChangeSetResponse, OfferRequest, OfferResponse,
    PullRequest, PullResponse,
};
use parking_lot::Mutex;

/// A sync transport carries protocol requests to the server.
///
/// Implementations may go over HTTP, a message bus, or in-process
/// loopback; the engine only sees request/response pairs.
pub trait SyncTransport: Send + Sync {
    /// Requests a write-authentication nonce.
    fn challenge(&self, request: &ChallengeRequest) -> ClientResult<ChallengeResponse>;

    /// Offers content hashes ahead of upload.
    fn offer(&self, request: &OfferRequest) -> ClientResult<OfferResponse>;

    /// Uploads one blob.
    fn upload(&self, request: &BlobUploadRequest) -> ClientResult<BlobUploadResponse>;

    /// Commits a batched change-set.
    fn commit(&self, request: &ChangeSetRequest) -> ClientResult<ChangeSetResponse>;

    /// Pulls authoritative records.
    fn pull(&self, request: &PullRequest) -> ClientResult<PullResponse>;

    /// Fetches one committed blob.
    fn fetch_blob(&self, request: &BlobFetchRequest) -> ClientResult<BlobFetchResponse>;
}

/// A mock transport for engine tests: every response is scripted.
#[derive(Default)]
pub struct MockTransport {
    challenge_response: Mutex<Option<ChallengeResponse>>,
    offer_response: Mutex<Option<OfferResponse>>,
    upload_response: Mutex<Option<BlobUploadResponse>>,
    commit_responses: Mutex<Vec<ChangeSetResponse>>,
    flaky_commits: Mutex<u32>,
    pull_response: Mutex<Option<PullResponse>>,
}

impl MockTransport {
    /// Creates a mock transport with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the challenge response.
    pub fn set_challenge_response(&self, response: ChallengeResponse) {
        *self.challenge_response.lock() = Some(response);
    }

    /// Sets the offer response.
    pub fn set_offer_response(&self, response: OfferResponse) {
        *self.offer_response.lock() = Some(response);
    }

    /// Sets the upload response.
    pub fn set_upload_response(&self, response: BlobUploadResponse) {
        *self.upload_response.lock() = Some(response);
    }

    /// Queues a commit response; responses are consumed in order.
    pub fn push_commit_response(&self, response: ChangeSetResponse) {
        self.commit_responses.lock().push(response);
    }

    /// Fails the next `count` commit calls as if the network dropped.
    pub fn fail_commits(&self, count: u32) {
        *self.flaky_commits.lock() = count;
    }

    /// Sets the pull response.
    pub fn set_pull_response(&self, response: PullResponse) {
        *self.pull_response.lock() = Some(response);
    }

    fn scripted<T: Clone>(slot: &Mutex<Option<T>>, what: &str) -> ClientResult<T> {
        slot.lock()
            .clone()
            .ok_or_else(|| ClientError::Protocol(format!("no mock {what} response set")))
    }
}

impl SyncTransport for MockTransport {
    fn challenge(&self, _request: &ChallengeRequest) -> ClientResult<ChallengeResponse> {
        Self::scripted(&self.challenge_response, "challenge")
    }

    fn offer(&self, _request: &OfferRequest) -> ClientResult<OfferResponse> {
        Self::scripted(&self.offer_response, "offer")
    }

    fn upload(&self, _request: &BlobUploadRequest) -> ClientResult<BlobUploadResponse> {
        Self::scripted(&self.upload_response, "upload")
    }

    fn commit(&self, _request: &ChangeSetRequest) -> ClientResult<ChangeSetResponse> {
        {
            let mut flaky = self.flaky_commits.lock();
            if *flaky > 0 {
                *flaky -= 1;
                return Err(ClientError::Network("connection reset".into()));
            }
        }
        let mut responses = self.commit_responses.lock();
        if responses.is_empty() {
            return Err(ClientError::Protocol("no mock commit response set".into()));
        }
        Ok(responses.remove(0))
    }

    fn pull(&self, _request: &PullRequest) -> ClientResult<PullResponse> {
        Self::scripted(&self.pull_response, "pull")
    }

    fn fetch_blob(&self, _request: &BlobFetchRequest) -> ClientResult<BlobFetchResponse> {
        Err(ClientError::Protocol("no mock blob response set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketsync_core::BucketKeypair;

    #[test]
    fn mock_returns_scripted_responses() {
        let transport = MockTransport::new();
        transport.set_challenge_response(ChallengeResponse {
            nonce: vec![7; 32],
        });

        let keypair = BucketKeypair::generate();
        let response = transport
            .challenge(&ChallengeRequest::new(keypair.bucket_id()))
            .unwrap();
        assert_eq!(response.nonce, vec![7; 32]);
    }

    #[test]
    fn mock_without_script_errors() {
        let transport = MockTransport::new();
        let keypair = BucketKeypair::generate();
        let result = transport.pull(&PullRequest {
            bucket_id: keypair.bucket_id(),
            since_revision: 0,
        });
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }

    #[test]
    fn commit_responses_consumed_in_order() {
        let transport = MockTransport::new();
        transport.push_commit_response(ChangeSetResponse::conflict(vec!["a.md".to_string()], 5));
        transport.push_commit_response(ChangeSetResponse::accepted(vec!["a.md".into()], 6));

        let keypair = BucketKeypair::generate();
        let request = ChangeSetRequest {
            proof: keypair.prove(b"nonce"),
            base_revision: 0,
            force: false,
            ops: vec![],
        };
        assert!(transport.commit(&request).unwrap().is_conflict());
        assert!(transport.commit(&request).unwrap().is_fully_accepted());
    }
}
