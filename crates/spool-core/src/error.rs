//! Error types shared across Spool crates

use thiserror::Error;

/// Errors raised by a [`DataEncryption`](crate::DataEncryption) implementation
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// A value could not be turned into event bytes
#[derive(Debug, Error)]
#[error("Failed to encode value: {0}")]
pub struct EncodingError(#[from] pub serde_json::Error);
