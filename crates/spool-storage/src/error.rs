//! Error types for spool-storage
//!
//! Block-level codec failures live in [`BlockError`]; everything touching
//! files, directories and write policy lives in [`StorageError`].

use thiserror::Error;

/// Errors raised while encoding or decoding TLV blocks
#[derive(Debug, Error)]
pub enum BlockError {
    /// Block data does not fit in the 4-byte length field
    #[error("Data length {length} exceeds the block length field")]
    DataLengthExceedsLimit { length: usize },

    /// Declared block length is larger than the reader accepts
    #[error("Block length {length} exceeds limit of {limit} bytes")]
    BytesLengthExceedsLimit { length: u64, limit: u64 },

    /// The stream ended mid-block or could not be read
    #[error("Read operation failed: {0}")]
    ReadOperationFailed(String),
}

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// A file could not be opened for reading
    #[error("Unable to create input stream for {0}")]
    UnableToCreateInputStream(String),

    /// A directory that must exist does not
    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    /// A single write is larger than the storage accepts
    #[error("Data of {size} bytes exceeds the maximum object size of {limit} bytes")]
    ObjectTooLarge { size: u64, limit: u64 },

    /// A single write can never fit in one file
    #[error("Data of {size} bytes exceeds the maximum file size of {limit} bytes")]
    FileTooSmall { size: u64, limit: u64 },

    /// TLV framing failure
    #[error(transparent)]
    Block(#[from] BlockError),

    /// At-rest encryption failure
    #[error(transparent)]
    Encryption(#[from] spool_core::EncryptionError),

    /// The serial queue is gone
    #[error("Storage queue closed: {0}")]
    QueueClosed(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl StorageError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new DirectoryNotFound error
    pub fn directory_not_found(path: impl Into<String>) -> Self {
        Self::DirectoryNotFound(path.into())
    }
}
