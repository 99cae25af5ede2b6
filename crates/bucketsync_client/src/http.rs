//! HTTP-shaped transport.
//!
//! The actual HTTP client is abstracted behind [`HttpClient`] so
//! embedders can plug in whichever library they already ship (or no
//! network at all via [`LoopbackClient`]). Bodies are CBOR both ways,
//! posted to the shared [`paths`](bucketsync_protocol::paths).
//!
//! Clients report failures through [`PostError`], which is how the
//! engine tells a dead network (retry with backoff) from a refused
//! write proof (stop immediately).

use crate::error::{ClientError, ClientResult};
use crate::transport::SyncTransport;
use bucketsync_protocol::{
    from_cbor, paths, to_cbor, BlobFetchRequest, BlobFetchResponse, BlobUploadRequest,
    BlobUploadResponse, ChallengeRequest, ChallengeResponse, ChangeSetRequest, ChangeSetResponse,
    OfferRequest, OfferResponse, PullRequest, PullResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Default per-request deadline when none is configured.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Failure mode of one POST, as classified by the [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostError {
    /// The request never completed (connection, DNS, local I/O).
    Unreachable(String),
    /// The request ran past its deadline.
    DeadlineExceeded,
    /// The server refused the request as unauthorized.
    Denied(String),
    /// The server answered with a failure unrelated to authorization.
    Rejected(String),
}

impl From<PostError> for ClientError {
    fn from(err: PostError) -> Self {
        match err {
            PostError::Unreachable(message) => ClientError::Network(message),
            PostError::DeadlineExceeded => ClientError::Timeout,
            PostError::Denied(message) => ClientError::AuthenticationFailed(message),
            PostError::Rejected(message) => ClientError::ServerError(message),
        }
    }
}

/// HTTP client abstraction: one POST, body in, body out.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request, bounded by `deadline`, and returns the
    /// response body.
    fn post(&self, url: &str, body: Vec<u8>, deadline: Duration) -> Result<Vec<u8>, PostError>;
}

/// A [`SyncTransport`] posting CBOR bodies over an [`HttpClient`].
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    deadline: Duration,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Sets the per-request deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// The server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_cbor<Req, Res>(&self, path: &str, request: &Req) -> ClientResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = to_cbor(request)?;
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url, body, self.deadline)?;
        Ok(from_cbor(&response)?)
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn challenge(&self, request: &ChallengeRequest) -> ClientResult<ChallengeResponse> {
        self.post_cbor(paths::CHALLENGE, request)
    }

    fn offer(&self, request: &OfferRequest) -> ClientResult<OfferResponse> {
        self.post_cbor(paths::OFFER, request)
    }

    fn upload(&self, request: &BlobUploadRequest) -> ClientResult<BlobUploadResponse> {
        self.post_cbor(paths::UPLOAD, request)
    }

    fn commit(&self, request: &ChangeSetRequest) -> ClientResult<ChangeSetResponse> {
        self.post_cbor(paths::COMMIT, request)
    }

    fn pull(&self, request: &PullRequest) -> ClientResult<PullResponse> {
        self.post_cbor(paths::PULL, request)
    }

    fn fetch_blob(&self, request: &BlobFetchRequest) -> ClientResult<BlobFetchResponse> {
        self.post_cbor(paths::BLOB, request)
    }
}

/// Routes POSTs directly to an in-process handler. Used by tests and
/// single-binary deployments that embed the server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a loopback client over the given handler.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

/// Anything that can answer a POST by path.
pub trait LoopbackServer {
    /// Handles one request body for `path`.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, PostError>;
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    // In-process calls cannot hang on the network; the deadline is
    // enforced only by real HTTP implementations.
    fn post(&self, url: &str, body: Vec<u8>, _deadline: Duration) -> Result<Vec<u8>, PostError> {
        let path = url.find("/sync/").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle_post(path, &body)
    }
}
