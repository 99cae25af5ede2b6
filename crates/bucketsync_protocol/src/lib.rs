//! # bucketsync sync protocol
//!
//! Wire types for the bucketsync protocol:
//!
//! - [`ChangeOp`] change-set operations (put / delete)
//! - Request/response message pairs (challenge, offer, upload, change-set,
//!   pull)
//! - [`ChangeNotification`] and the poll-based [`NotificationFeed`]
//! - CBOR encoding/decoding helpers over serde
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod messages;
mod notify;
mod operation;

pub use codec::{from_cbor, to_cbor};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    paths, BlobFetchRequest, BlobFetchResponse, BlobUploadRequest, BlobUploadResponse,
    ChallengeRequest, ChallengeResponse, ChangeSetRequest, ChangeSetResponse, OfferRequest,
    OfferResponse, PullRequest, PullResponse, RejectReason, RejectedOp, PROTOCOL_VERSION,
};
pub use notify::{ChangeNotification, NotificationFeed, MAX_RETAINED};
pub use operation::{ChangeOp, PayloadSource};
