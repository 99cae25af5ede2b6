//! Bucket key identity: Ed25519 keypairs and write-authentication proofs.
//!
//! A bucket is addressed by its public key: the bucket id is the SHA-256
//! digest of the verifying key bytes. Holding the public key identifies and
//! reads a bucket; every mutating request must additionally carry a proof
//! signed with the private key over a server-issued nonce.

use crate::error::{CoreError, CoreResult};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a serialized public key.
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Length of a serialized private (signing) key seed.
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Length of a detached signature.
pub const SIGNATURE_SIZE: usize = 64;

/// A bucket identity, derived from the bucket's public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketId([u8; 32]);

impl BucketId {
    /// Derives the id of the bucket owned by `public_key`.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = Sha256::digest(public_key.as_bytes());
        Self(digest.into())
    }

    /// Parses an id from its lowercase hex form.
    pub fn from_hex(s: &str) -> CoreResult<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidBucketId(e.to_string()))?;
        let id: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidBucketId("wrong length".into()))?;
        Ok(Self(id))
    }

    /// Returns the raw id bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Returns true if `s` is a well-formed hex bucket id.
pub fn is_valid_bucket_id(s: &str) -> bool {
    BucketId::from_hex(s).is_ok()
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketId({})", &self.to_hex()[..12])
    }
}

/// A bucket's public (verifying) key.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Creates a public key from raw bytes, validating the curve point.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let raw: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_key_size(bytes.len(), PUBLIC_KEY_SIZE))?;
        VerifyingKey::from_bytes(&raw).map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        Ok(Self(raw))
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Returns the lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derives the bucket id owned by this key.
    pub fn bucket_id(&self) -> BucketId {
        BucketId::from_public_key(self)
    }

    fn verifying_key(&self) -> CoreResult<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| CoreError::InvalidKey(e.to_string()))
    }

    /// Verifies `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CoreResult<()> {
        let raw: [u8; SIGNATURE_SIZE] = signature
            .try_into()
            .map_err(|_| CoreError::invalid_key_size(signature.len(), SIGNATURE_SIZE))?;
        let signature = Signature::from_bytes(&raw);
        self.verifying_key()?
            .verify(message, &signature)
            .map_err(|_| CoreError::BadSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..12])
    }
}

/// A bucket keypair: the private half authorizes writes.
#[derive(Clone)]
pub struct BucketKeypair {
    signing: SigningKey,
}

impl BucketKeypair {
    /// Generates a fresh keypair.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            signing: SigningKey::generate(&mut rng),
        }
    }

    /// Restores a keypair from a 32-byte private key seed.
    pub fn from_private_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let raw: [u8; PRIVATE_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_key_size(bytes.len(), PRIVATE_KEY_SIZE))?;
        Ok(Self {
            signing: SigningKey::from_bytes(&raw),
        })
    }

    /// Restores a keypair from the hex form produced by [`private_hex`].
    ///
    /// [`private_hex`]: Self::private_hex
    pub fn from_private_hex(s: &str) -> CoreResult<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidKey(e.to_string()))?;
        Self::from_private_bytes(&bytes)
    }

    /// Returns the private key seed bytes.
    ///
    /// Handle with care: never log or transmit unencrypted.
    pub fn private_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.signing.to_bytes()
    }

    /// Returns the private key as hex, for export to a key file.
    pub fn private_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    /// Returns the public half.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key().to_bytes())
    }

    /// Derives the bucket id this keypair owns.
    pub fn bucket_id(&self) -> BucketId {
        self.public_key().bucket_id()
    }

    /// Signs `message`, returning a detached signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }

    /// Produces a write-authentication proof over a server-issued nonce.
    pub fn prove(&self, nonce: &[u8]) -> AuthProof {
        let message = proof_message(nonce, &self.bucket_id());
        AuthProof {
            public_key: self.public_key(),
            nonce: nonce.to_vec(),
            signature: self.sign(&message),
        }
    }
}

impl fmt::Debug for BucketKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketKeypair")
            .field("public_key", &self.public_key())
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Proof of write authority: a signature over `nonce || bucket_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthProof {
    /// The claiming public key.
    pub public_key: PublicKey,
    /// The server-issued nonce this proof consumes.
    pub nonce: Vec<u8>,
    /// Detached Ed25519 signature.
    pub signature: Vec<u8>,
}

impl AuthProof {
    /// Verifies the proof and returns the authenticated bucket id.
    ///
    /// Nonce freshness is the caller's responsibility; this only checks the
    /// signature binds the nonce to the key's bucket.
    pub fn authenticate(&self) -> CoreResult<BucketId> {
        let bucket_id = self.public_key.bucket_id();
        let message = proof_message(&self.nonce, &bucket_id);
        self.public_key.verify(&message, &self.signature)?;
        Ok(bucket_id)
    }
}

fn proof_message(nonce: &[u8], bucket_id: &BucketId) -> Vec<u8> {
    let mut message = Vec::with_capacity(nonce.len() + 32);
    message.extend_from_slice(nonce);
    message.extend_from_slice(bucket_id.as_bytes());
    message
}
