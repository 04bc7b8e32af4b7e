//! Upload pipeline for Spool
//!
//! Moves batches out of [`spool_storage::FeatureStorage`] and into the
//! intake over HTTP.
//!
//! ## Features
//!
//! - **Request building**: intake url, query, headers and body framing per feature
//! - **Compression**: zlib (`Content-Encoding: deflate`) when it shrinks the body
//! - **Status classification**: accepted, unauthorized, retryable or dropped
//! - **Backoff**: upload delay shrinks while uploads succeed and grows otherwise
//! - **Worker**: a tokio task per feature, with flush and cancel
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use spool_upload::{AlwaysReady, DataUploadWorker, DataUploader, JsonBatchRequestBuilder, ReqwestHttpClient, UploadPreset};
//!
//! let uploader = DataUploader::new(
//!     Arc::new(ReqwestHttpClient::new()?),
//!     Arc::new(JsonBatchRequestBuilder::logs()),
//! );
//! let worker = DataUploadWorker::new(
//!     "logs",
//!     storage,
//!     uploader,
//!     Arc::new(AlwaysReady),
//!     context_rx,
//!     &UploadPreset::default(),
//!     telemetry,
//! );
//! worker.start()?;
//! ```

pub mod client;
pub mod compression;
pub mod conditions;
pub mod delay;
pub mod error;
pub mod request;
pub mod status;
pub mod uploader;
pub mod worker;

pub use client::{DEFAULT_REQUEST_TIMEOUT, HttpClient, HttpResponse, ReqwestHttpClient};
pub use conditions::{AlwaysReady, Blocker, UploadConditions};
pub use delay::{UploadDelay, UploadPreset};
pub use error::{HttpClientError, RequestError, UploadError, UploadResult};
pub use request::{
    ContentType, FeatureRequestBuilder, HttpHeader, JsonBatchRequestBuilder, MultipartFormData,
    MultipartRequestBuilder, QueryItem, RequestBuilder, UploadRequest,
};
pub use status::{UploadStatus, UploadStatusError};
pub use uploader::DataUploader;
pub use worker::DataUploadWorker;
