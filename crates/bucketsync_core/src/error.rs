//! Error types shared by the core building blocks.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the core layer.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A key had the wrong length.
    #[error("invalid key size: got {got}, expected {expected}")]
    InvalidKeySize {
        /// The size that was provided.
        got: usize,
        /// The size that was required.
        expected: usize,
    },

    /// A bucket id failed to parse.
    #[error("invalid bucket id: {0}")]
    InvalidBucketId(String),

    /// A public key or signature failed to parse or verify.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Signature verification failed.
    #[error("signature verification failed")]
    BadSignature,

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key, truncated or tampered ciphertext).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Creates an invalid-key-size error.
    pub fn invalid_key_size(got: usize, expected: usize) -> Self {
        Self::InvalidKeySize { got, expected }
    }

    /// Creates a key-derivation error.
    pub fn key_derivation(message: impl Into<String>) -> Self {
        Self::KeyDerivation(message.into())
    }

    /// Creates an encryption error.
    pub fn encryption(message: impl Into<String>) -> Self {
        Self::Encryption(message.into())
    }

    /// Creates a decryption error.
    pub fn decryption(message: impl Into<String>) -> Self {
        Self::Decryption(message.into())
    }
}
