//! Feature registration
//!
//! A feature is a named stream of events with its own storage directory,
//! request format and upload worker. [`FeatureConfig`] describes one before
//! registration; [`FeatureHandle`] is what the feature gets back to write
//! events with.

use std::sync::Arc;

use spool_core::{SdkContext, TrackingConsent, Writer};
use spool_storage::FeatureStorage;
use spool_upload::{
    AlwaysReady, FeatureRequestBuilder, JsonBatchRequestBuilder, MultipartRequestBuilder, UploadConditions,
};
use tokio::sync::watch;

use crate::preset::PerformancePresetOverride;

/// Everything needed to register a feature
pub struct FeatureConfig {
    pub name: String,
    pub request_builder: Arc<dyn FeatureRequestBuilder>,
    pub performance_override: Option<PerformancePresetOverride>,
    pub upload_conditions: Arc<dyn UploadConditions>,
}

impl FeatureConfig {
    pub fn new(name: impl Into<String>, request_builder: Arc<dyn FeatureRequestBuilder>) -> Self {
        Self {
            name: name.into(),
            request_builder,
            performance_override: None,
            upload_conditions: Arc::new(AlwaysReady),
        }
    }

    /// Logs feature, uploading JSON arrays
    pub fn logs(compress: bool) -> Self {
        Self::new("logs", Arc::new(JsonBatchRequestBuilder::logs().with_compression(compress)))
    }

    /// RUM feature, uploading newline-delimited JSON
    pub fn rum(compress: bool) -> Self {
        Self::new("rum", Arc::new(JsonBatchRequestBuilder::rum().with_compression(compress)))
    }

    /// Tracing feature, uploading newline-delimited spans
    pub fn traces(compress: bool) -> Self {
        Self::new("tracing", Arc::new(JsonBatchRequestBuilder::traces().with_compression(compress)))
    }

    /// Session replay feature, uploading multipart segments
    pub fn session_replay() -> Self {
        Self::new("session-replay", Arc::new(MultipartRequestBuilder::replay()))
    }

    pub fn with_performance_override(mut self, overrides: PerformancePresetOverride) -> Self {
        self.performance_override = Some(overrides);
        self
    }

    pub fn with_upload_conditions(mut self, conditions: Arc<dyn UploadConditions>) -> Self {
        self.upload_conditions = conditions;
        self
    }
}

impl std::fmt::Debug for FeatureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureConfig")
            .field("name", &self.name)
            .field("performance_override", &self.performance_override)
            .finish_non_exhaustive()
    }
}

/// A registered feature
#[derive(Clone)]
pub struct FeatureHandle {
    storage: FeatureStorage,
    writer: Arc<dyn Writer>,
    context: watch::Receiver<SdkContext>,
}

impl FeatureHandle {
    pub(crate) fn new(storage: FeatureStorage, context: watch::Receiver<SdkContext>) -> Self {
        let writer = storage.context_writer(context.clone());
        Self {
            storage,
            writer,
            context,
        }
    }

    pub fn name(&self) -> &str {
        self.storage.feature_name()
    }

    /// Writer following the SDK's tracking consent.
    ///
    /// Consent is resolved when the event reaches storage. Events stored
    /// while it is pending are kept aside; events stored while it is not
    /// granted are dropped.
    pub fn writer(&self) -> Arc<dyn Writer> {
        self.writer.clone()
    }

    /// Current tracking consent of the SDK
    pub fn tracking_consent(&self) -> TrackingConsent {
        self.context.borrow().tracking_consent
    }

    pub fn storage(&self) -> &FeatureStorage {
        &self.storage
    }
}

impl std::fmt::Debug for FeatureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureHandle").field("name", &self.name()).finish()
    }
}
