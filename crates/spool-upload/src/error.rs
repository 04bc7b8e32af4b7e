//! Error types for spool-upload

use thiserror::Error;

use spool_storage::StorageError;

/// Errors raised while turning a batch into a request.
///
/// These are unrecoverable for the batch: it is dropped and never retried.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Client token is missing")]
    MissingClientToken,

    #[error("Invalid value for header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },

    #[error("Invalid intake url {url}")]
    InvalidUrl { url: String },

    #[error("Malformed batch: {0}")]
    MalformedBatch(String),
}

/// Errors raised by an [`HttpClient`](crate::HttpClient)
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Errors raised by the upload worker
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Http(#[from] HttpClientError),

    #[error("Upload worker must be started from within a tokio runtime")]
    NoRuntime,
}

/// Result type for upload operations
pub type UploadResult<T> = Result<T, UploadError>;
