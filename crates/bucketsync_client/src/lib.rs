//! # bucketsync client
//!
//! Client-side sync for bucketsync: scans a local directory, diffs it
//! against the last-synced manifest, compiles derived artifacts, and
//! pushes the result to a sync server as blobs plus a batched
//! change-set.
//!
//! This crate provides:
//! - Manifest persistence under `.bucketsync/`
//! - Directory scanner with a size+mtime cheap filter
//! - Scan-vs-manifest diff producing local change ops
//! - Sync engine (scan → diff → compile → upload → commit)
//! - Conflict recovery by pull-and-rebase
//! - Retry with full-jitter exponential backoff
//! - HTTP transport abstraction with an in-process loopback
//!
//! ## Key Invariants
//!
//! - Content hashes are computed over plaintext, before encryption
//! - Every authenticated request carries a fresh single-use nonce proof
//! - The manifest only advances after the server accepts a change-set
//! - A conflicted commit is retried once after rebasing, then surfaced

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod diff;
mod engine;
mod error;
mod http;
mod manifest;
mod runner;
mod scanner;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use diff::{diff, LocalChange};
pub use engine::{SyncEngine, SyncPhase, SyncReport, SyncStats};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer, PostError};
pub use manifest::{Manifest, MANIFEST_FILE, STATE_DIR};
pub use runner::{SyncPool, SyncRunner};
pub use scanner::{scan, ScannedFile};
pub use transport::{MockTransport, SyncTransport};
