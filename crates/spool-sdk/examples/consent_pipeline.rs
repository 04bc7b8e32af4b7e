//! Walks one feature through pending and granted consent.
//!
//! Uploads go to a client that only logs them, so nothing leaves the
//! machine. Run with `RUST_LOG=spool_storage=trace` for per-write detail.

use std::sync::Arc;

use async_trait::async_trait;
use spool_logging::{Component, LogConfig, SpoolSubscriberBuilder};
use spool_sdk::{Event, FeatureConfig, SdkConfig, SdkResult, SpoolCore, TrackingConsent};
use spool_upload::{HttpClient, HttpClientError, HttpResponse, UploadRequest};

/// Accepts every request after logging it
struct LoggingHttpClient;

#[async_trait]
impl HttpClient for LoggingHttpClient {
    async fn send(&self, request: UploadRequest) -> Result<HttpResponse, HttpClientError> {
        tracing::info!(
            url = %request.url,
            body = %String::from_utf8_lossy(&request.body),
            "Upload"
        );
        Ok(HttpResponse { status: 202 })
    }
}

#[tokio::main]
async fn main() -> SdkResult<()> {
    let _guard = SpoolSubscriberBuilder::new()
        .with_config(LogConfig::development().with_component(Component::Sdk, "debug"))
        .init();

    let storage = tempfile::tempdir().map_err(spool_storage::StorageError::from)?;
    let config = SdkConfig::new("demo-client-token")
        .with_storage_dir(storage.path())
        .with_tracking_consent(TrackingConsent::Pending)
        .with_upload_compression(false);
    let core = SpoolCore::builder(config)
        .with_http_client(Arc::new(LoggingHttpClient))
        .build()?;

    let logs = core.register_feature(FeatureConfig::logs(false))?;
    let writer = logs.writer();
    writer.write(Event::new(br#"{"message":"kept until consent is known"}"#.to_vec()));

    core.set_tracking_consent(TrackingConsent::Granted);
    writer.write(Event::new(br#"{"message":"written after consent"}"#.to_vec()));

    core.flush_and_tear_down().await
}
