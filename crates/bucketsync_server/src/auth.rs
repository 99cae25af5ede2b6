//! Write authentication: nonce issuance and proof verification.
//!
//! Reads need only a bucket id. Writes are challenge/response: the
//! server issues a random single-use nonce for a bucket, the client
//! signs `nonce || bucket_id` with the bucket's private key, and the
//! server verifies the signature against the public key the bucket was
//! registered with. A nonce is consumed by its first use and expires
//! after a TTL either way, so captured proofs cannot be replayed.

use crate::error::{ServerError, ServerResult};
use bucketsync_core::{AuthProof, BucketId};
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Length of an issued nonce in bytes.
pub const NONCE_SIZE: usize = 32;

#[derive(Debug, Clone)]
struct IssuedNonce {
    bucket_id: BucketId,
    issued_at: Instant,
}

/// Issues and consumes single-use write-authentication nonces.
pub struct NonceStore {
    nonces: Mutex<HashMap<Vec<u8>, IssuedNonce>>,
    ttl: Duration,
}

impl NonceStore {
    /// Creates a store whose nonces expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            nonces: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Issues a fresh nonce bound to `bucket_id`.
    pub fn issue(&self, bucket_id: BucketId) -> Vec<u8> {
        let mut nonce = vec![0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let mut nonces = self.nonces.lock();
        // Expired entries pile up only if clients abandon challenges;
        // sweep them while we hold the lock anyway.
        let ttl = self.ttl;
        nonces.retain(|_, issued| issued.issued_at.elapsed() < ttl);
        nonces.insert(
            nonce.clone(),
            IssuedNonce {
                bucket_id,
                issued_at: Instant::now(),
            },
        );
        nonce
    }

    /// Verifies a proof and consumes its nonce.
    ///
    /// Returns the authenticated bucket id. Fails if the signature does
    /// not verify, the nonce was never issued (or already used), the
    /// nonce was issued for a different bucket, or the TTL has passed.
    pub fn verify(&self, proof: &AuthProof) -> ServerResult<BucketId> {
        let bucket_id = proof
            .authenticate()
            .map_err(|err| ServerError::AuthenticationFailed(err.to_string()))?;

        let issued = self
            .nonces
            .lock()
            .remove(&proof.nonce)
            .ok_or_else(|| ServerError::AuthenticationFailed("unknown or used nonce".into()))?;

        if issued.bucket_id != bucket_id {
            return Err(ServerError::AuthenticationFailed(
                "nonce issued for a different bucket".into(),
            ));
        }
        if issued.issued_at.elapsed() >= self.ttl {
            return Err(ServerError::AuthenticationFailed("nonce expired".into()));
        }
        Ok(bucket_id)
    }

    /// Number of outstanding nonces.
    pub fn outstanding(&self) -> usize {
        self.nonces.lock().len()
    }
}
