//! Block encryption for data at rest.
//!
//! Every stored block is sealed independently with ChaCha20-Poly1305
//! under one storage key. A fresh random nonce is generated per block and
//! stored in front of the ciphertext:
//!
//! ```text
//! +-------------+-----------------------------+
//! | nonce (12B) | ciphertext + tag (len + 16) |
//! +-------------+-----------------------------+
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use spool_crypto::{AtRestEncryption, generate_storage_key};
//!
//! let encryption = AtRestEncryption::new(generate_storage_key());
//! let config = FeatureStorageConfig::new("logs").with_encryption(Arc::new(encryption));
//! ```

use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use spool_core::{DataEncryption, EncryptionError};

use crate::error::{CryptoError, CryptoResult};

/// Size of storage keys (256 bits for ChaCha20).
pub const STORAGE_KEY_SIZE: usize = 32;
/// Size of the per-block nonce.
pub const NONCE_SIZE: usize = 12;
/// Size of the Poly1305 authentication tag.
pub const TAG_SIZE: usize = 16;
/// Bytes added to every encrypted block.
pub const ENCRYPTION_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Generate a new random storage key.
///
/// Uses the system's cryptographically secure random number generator.
pub fn generate_storage_key() -> [u8; STORAGE_KEY_SIZE] {
    let mut key = [0u8; STORAGE_KEY_SIZE];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Encrypts stored blocks with a single symmetric key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AtRestEncryption {
    key: [u8; STORAGE_KEY_SIZE],
}

impl AtRestEncryption {
    /// Create from a raw 256-bit key
    pub fn new(key: [u8; STORAGE_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Create from a key slice, which must be exactly 32 bytes
    pub fn from_slice(key: &[u8]) -> CryptoResult<Self> {
        let key: [u8; STORAGE_KEY_SIZE] = key.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("expected {STORAGE_KEY_SIZE} bytes, got {}", key.len()))
        })?;
        Ok(Self { key })
    }

    /// Seal `plaintext`, returning nonce || ciphertext
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open data produced by [`seal`](Self::seal)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data is shorter than a nonce and tag
    /// - The key is incorrect
    /// - The ciphertext has been tampered with
    pub fn open(&self, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        if sealed.len() < ENCRYPTION_OVERHEAD {
            return Err(CryptoError::DataTooShort {
                expected: ENCRYPTION_OVERHEAD,
                actual: sealed.len(),
            });
        }

        let cipher = ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

impl std::fmt::Debug for AtRestEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtRestEncryption").finish_non_exhaustive()
    }
}

impl DataEncryption for AtRestEncryption {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(self.seal(data)?)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(self.open(data)?)
    }
}
