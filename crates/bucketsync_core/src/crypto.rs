//! Optional client-side encryption of blob payloads.
//!
//! The bucket secret is derived deterministically from the bucket's private
//! key with HKDF-SHA256 and a fixed, versioned info string, so any client
//! holding the private key derives the same secret. Ciphertexts use a fresh
//! random nonce per write: identical plaintexts encrypt to different bytes,
//! which is why content identity is always computed on plaintext before
//! encryption and the server treats encrypted blobs as opaque.

use crate::error::{CoreError, CoreResult};
use crate::keys::BucketKeypair;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// HKDF salt fixed for all bucketsync deployments.
const SECRET_SALT: &[u8] = b"bucketsync-secret-salt";
/// Versioned HKDF info string; bump when the secret scheme changes.
const SECRET_INFO: &[u8] = b"bucketsync-blob-key-v1";

/// The symmetric secret encrypting a bucket's blobs.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct BucketSecret {
    bytes: [u8; KEY_SIZE],
}

impl BucketSecret {
    /// Derives the bucket secret from the bucket's private key.
    ///
    /// Deterministic: the same keypair always yields the same secret.
    pub fn derive(keypair: &BucketKeypair) -> CoreResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let mut private = keypair.private_bytes();
        let hk = Hkdf::<Sha256>::new(Some(SECRET_SALT), &private);
        private.zeroize();

        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(SECRET_INFO, &mut bytes)
            .map_err(|_| CoreError::key_derivation("HKDF expand failed"))?;
        Ok(Self { bytes })
    }

    /// Creates a secret from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    /// Returns the secret bytes. Never log or serialize the result.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for BucketSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// AES-256-GCM cipher over blob payloads.
///
/// Output layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
pub struct BlobCipher {
    cipher: Aes256Gcm,
}

impl BlobCipher {
    /// Creates a cipher from a bucket secret.
    pub fn new(secret: &BucketSecret) -> Self {
        let key = GenericArray::from_slice(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypts a plaintext payload with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> CoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CoreError::encryption("aead failure"))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend(ciphertext);
        Ok(out)
    }

    /// Decrypts a payload produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, payload: &[u8]) -> CoreResult<Vec<u8>> {
        if payload.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CoreError::decryption("ciphertext too short"));
        }
        let nonce = Nonce::from_slice(&payload[..NONCE_SIZE]);
        self.cipher
            .decrypt(nonce, &payload[NONCE_SIZE..])
            .map_err(|_| CoreError::decryption("aead failure"))
    }
}

impl std::fmt::Debug for BlobCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::BucketKeypair;

    #[test]
    fn secret_derivation_is_deterministic() {
        let keypair = BucketKeypair::generate();
        let a = BucketSecret::derive(&keypair).unwrap();
        let b = BucketSecret::derive(&keypair).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());

        // A client restoring the same private key derives the same secret.
        let restored = BucketKeypair::from_private_bytes(&keypair.private_bytes()).unwrap();
        let c = BucketSecret::derive(&restored).unwrap();
        assert_eq!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn different_buckets_different_secrets() {
        let a = BucketSecret::derive(&BucketKeypair::generate()).unwrap();
        let b = BucketSecret::derive(&BucketKeypair::generate()).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let secret = BucketSecret::derive(&BucketKeypair::generate()).unwrap();
        let cipher = BlobCipher::new(&secret);

        let plaintext = b"post body";
        let ciphertext = cipher.encrypt(plaintext).unwrap();
        assert_ne!(&ciphertext[NONCE_SIZE..], plaintext.as_slice());
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn identical_plaintexts_differ_bit_for_bit() {
        let secret = BucketSecret::derive(&BucketKeypair::generate()).unwrap();
        let cipher = BlobCipher::new(&secret);

        let a = cipher.encrypt(b"same bytes").unwrap();
        let b = cipher.encrypt(b"same bytes").unwrap();
        assert_ne!(a, b);

        assert_eq!(cipher.decrypt(&a).unwrap(), cipher.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let cipher_a = BlobCipher::new(&BucketSecret::derive(&BucketKeypair::generate()).unwrap());
        let cipher_b = BlobCipher::new(&BucketSecret::derive(&BucketKeypair::generate()).unwrap());

        let ciphertext = cipher_a.encrypt(b"secret").unwrap();
        assert!(cipher_b.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn truncated_or_tampered_fails() {
        let secret = BucketSecret::derive(&BucketKeypair::generate()).unwrap();
        let cipher = BlobCipher::new(&secret);

        assert!(cipher.decrypt(&[0u8; 10]).is_err());

        let mut ciphertext = cipher.encrypt(b"data").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(cipher.decrypt(&ciphertext).is_err());
    }
}
