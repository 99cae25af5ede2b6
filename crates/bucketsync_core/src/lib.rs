//! # bucketsync core
//!
//! Shared building blocks for the bucketsync client and server:
//!
//! - [`ContentHash`] and streaming content hashing
//! - File classification and the pure compiler pipeline
//! - Bucket key identity (Ed25519) and client-side encryption
//! - The record/blob data model shared across the wire and the store
//!
//! This crate performs no network I/O. Filesystem access is limited to
//! [`hash::hash_path`], which never fails on an unreadable entry.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classify;
mod compile;
mod crypto;
mod error;
pub mod hash;
mod keys;
mod types;

pub use classify::FileKind;
pub use compile::{
    compile, CompileConfig, CompileFailure, CompileOutcome, CompiledArtifact, VARIANT_EXCERPT,
    VARIANT_HTML, VARIANT_MIN,
};
pub use crypto::{BlobCipher, BucketSecret, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{CoreError, CoreResult};
pub use hash::{ContentHash, ContentHasher};
pub use keys::{is_valid_bucket_id, AuthProof, BucketId, BucketKeypair, PublicKey};
pub use types::{now_millis, BlobEncoding, BucketInfo, ManifestEntry, Record, Revision};
