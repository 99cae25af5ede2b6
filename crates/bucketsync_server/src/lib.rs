//! # bucketsync server
//!
//! Embeddable sync server for bucketsync deployments.
//!
//! This crate provides:
//! - challenge/response write authentication over bucket keypairs
//!   (single-use nonces, Ed25519 proofs)
//! - handlers for the full sync flow: offer, blob upload, change-set
//!   commit, pull, blob fetch
//! - [`SyncEndpoint`], a path-dispatched CBOR endpoint with no listener
//!   of its own, embeddable behind any HTTP server or called in-process
//!
//! All state lives in a shared [`RecordStore`](bucketsync_store::RecordStore);
//! the server itself is stateless apart from outstanding nonces.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod endpoint;
mod error;
mod handler;

pub use auth::{NonceStore, NONCE_SIZE};
pub use config::ServerConfig;
pub use endpoint::SyncEndpoint;
pub use error::{ServerError, ServerResult};
pub use handler::SyncHandler;
