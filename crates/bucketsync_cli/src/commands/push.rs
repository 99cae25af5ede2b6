//! Push command implementation.
//!
//! Publishes a directory into a local blob store by running the full
//! sync pipeline against an embedded endpoint, no network involved.
//! Records live only for the run; blobs persist in the store directory
//! and are deduplicated across runs.

use bucketsync_client::{
    HttpTransport, LoopbackClient, LoopbackServer, PostError, RetryConfig, SyncConfig,
    SyncEngine, MANIFEST_FILE, STATE_DIR,
};
use bucketsync_server::{ServerConfig, ServerError, SyncEndpoint};
use bucketsync_store::{FsBlobStore, RecordStore, StoreConfig, StoreError};
use std::path::Path;
use std::sync::Arc;

/// Adapts the embedded endpoint to the client's loopback trait.
struct EmbeddedServer {
    endpoint: Arc<SyncEndpoint>,
}

impl LoopbackServer for EmbeddedServer {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, PostError> {
        self.endpoint.dispatch(path, body).map_err(|err| {
            let message = err.to_string();
            match err {
                ServerError::AuthenticationFailed(_)
                | ServerError::Store(StoreError::UnknownBucket(_)) => PostError::Denied(message),
                _ => PostError::Rejected(message),
            }
        })
    }
}

/// Runs the push command.
pub fn run(
    root: &Path,
    store_dir: &Path,
    key: &Path,
    encrypt: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !root.is_dir() {
        return Err(format!("Not a directory: {:?}", root).into());
    }
    let keypair = super::keygen::load_keypair(key)?;

    let blobs = FsBlobStore::open(store_dir.join("blobs"))?;
    let store = Arc::new(RecordStore::new(Arc::new(blobs), StoreConfig::default()));
    let endpoint = Arc::new(SyncEndpoint::new(
        ServerConfig::default().with_auto_create_buckets(true),
        store,
    ));

    // The embedded endpoint starts at revision zero every run, so the
    // manifest must too: each push is a fresh full publish.
    let manifest_path = root.join(STATE_DIR).join(MANIFEST_FILE);
    if manifest_path.exists() {
        std::fs::remove_file(&manifest_path)?;
    }

    let config = SyncConfig::new("loopback://local")
        .with_encryption(encrypt)
        .with_retry(RetryConfig::single_attempt());
    let transport = HttpTransport::new(
        "loopback://local",
        LoopbackClient::new(EmbeddedServer { endpoint }),
    )
    .with_deadline(config.timeout);

    tracing::info!(root = %root.display(), store = %store_dir.display(), encrypt, "pushing");
    let engine = SyncEngine::new(root, keypair, config, transport)?;
    let report = engine.sync()?;
    tracing::debug!(
        committed = report.committed.len(),
        uploaded = report.blobs_uploaded,
        revision = report.revision,
        "push complete"
    );

    println!("Pushed {} to {}", root.display(), store_dir.display());
    println!("  Committed: {} path(s)", report.committed.len());
    println!("  Uploaded:  {} blob(s)", report.blobs_uploaded);
    println!("  Revision:  {}", report.revision);
    for (path, failure) in &report.compile_failures {
        println!("  COMPILE FAILED {} ({}): {}", path, failure.variant, failure.message);
    }
    for rejected in &report.rejected {
        println!("  REJECTED {}: {:?}", rejected.path, rejected.reason);
    }
    Ok(())
}
