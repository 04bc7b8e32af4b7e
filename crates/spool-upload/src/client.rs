//! HTTP transport seam

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::error::HttpClientError;
use crate::request::UploadRequest;

/// Timeout for one upload request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Response of the intake; only the status code matters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
}

/// Sends upload requests.
///
/// Implementations return `Err` only when no response was received.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: UploadRequest) -> Result<HttpResponse, HttpClientError>;
}

/// [`HttpClient`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self, HttpClientError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpClientError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Use an existing client, e.g. one configured with a proxy
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: UploadRequest) -> Result<HttpResponse, HttpClientError> {
        trace!(url = %request.url, bytes = request.body.len(), "Sending upload request");
        let response = self
            .client
            .post(&request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| HttpClientError::Network(e.to_string()))?;
        Ok(HttpResponse {
            status: response.status().as_u16(),
        })
    }
}
