//! # bucketsync store
//!
//! The authoritative server-side storage layer:
//!
//! - [`BlobStore`] — capability trait for content-addressed byte storage,
//!   with [`FsBlobStore`] (persistent, sharded) and [`MemoryBlobStore`]
//!   (tests/ephemeral) backends chosen at construction time
//! - [`RecordStore`] — per-bucket path → record mapping with revisioning,
//!   whole-batch conflict checks, tombstones, and cross-bucket blob
//!   reference counting
//! - a reclamation pass that purges expired tombstones and unreferenced
//!   blobs after a grace period
//!
//! The record store never depends on which concrete blob backend is
//! active.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob;
mod config;
mod error;
mod fs;
mod memory;
mod records;

pub use blob::{BlobStore, StoredBlob};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;
pub use records::{ReclaimReport, RecordStore};
