//! Error types for the SDK core

use thiserror::Error;

/// Errors that can occur in the SDK core
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] spool_storage::StorageError),

    /// Upload error
    #[error("Upload error: {0}")]
    Upload(#[from] spool_upload::UploadError),

    /// Encryption key error
    #[error("Crypto error: {0}")]
    Crypto(#[from] spool_crypto::CryptoError),

    /// A feature with this name is already registered
    #[error("Feature already registered: {0}")]
    FeatureAlreadyRegistered(String),

    /// No feature with this name is registered
    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    /// The core was stopped
    #[error("SDK core stopped")]
    Stopped,
}

/// Result type alias for SDK operations
pub type SdkResult<T> = Result<T, SdkError>;
