//! Sending one batch

use std::sync::Arc;

use tracing::debug;

use spool_core::{Event, SdkContext};

use crate::client::HttpClient;
use crate::error::RequestError;
use crate::request::FeatureRequestBuilder;
use crate::status::UploadStatus;

/// Builds a request for a batch and sends it
#[derive(Clone)]
pub struct DataUploader {
    client: Arc<dyn HttpClient>,
    request_builder: Arc<dyn FeatureRequestBuilder>,
}

impl DataUploader {
    pub fn new(client: Arc<dyn HttpClient>, request_builder: Arc<dyn FeatureRequestBuilder>) -> Self {
        Self {
            client,
            request_builder,
        }
    }

    /// Upload `events`.
    ///
    /// Fails only when no request can be built; network failures are
    /// reported through the returned status.
    pub async fn upload(&self, events: &[Event], context: &SdkContext) -> Result<UploadStatus, RequestError> {
        let request = self.request_builder.request(events, context)?;
        let request_id = request.request_id();
        let status = match self.client.send(request).await {
            Ok(response) => UploadStatus::from_response(response.status, request_id),
            Err(e) => UploadStatus::from_network_error(&e, request_id),
        };
        debug!(events = events.len(), status = %status, "Upload finished");
        Ok(status)
    }
}
