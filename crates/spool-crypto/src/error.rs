//! Error types for spool-crypto

use thiserror::Error;

/// Errors that can occur during at-rest encryption
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Data too short: expected at least {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for spool_core::EncryptionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::EncryptionFailed(_) | CryptoError::InvalidKey(_) => {
                spool_core::EncryptionError::Encrypt(err.to_string())
            }
            CryptoError::DecryptionFailed(_) | CryptoError::DataTooShort { .. } => {
                spool_core::EncryptionError::Decrypt(err.to_string())
            }
        }
    }
}
