//! Configuration for the SDK core

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use spool_core::{SdkContext, Site, TrackingConsent};
use spool_crypto::{AtRestEncryption, STORAGE_KEY_SIZE};

use crate::error::{SdkError, SdkResult};
use crate::preset::{BatchProcessingLevel, BatchSize, PerformancePreset, UploadFrequency};

/// Configuration for a [`SpoolCore`](crate::SpoolCore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Client token authorizing uploads
    pub client_token: String,
    /// Environment name, e.g. `prod`
    pub env: String,
    /// Service name
    pub service: String,
    /// Application version
    pub version: String,
    /// Intake site
    pub site: Site,
    /// Base directory for all persisted data
    pub storage_dir: PathBuf,
    /// Name of this SDK instance; each instance stores data in its own directory
    pub instance_name: String,
    pub batch_size: BatchSize,
    pub upload_frequency: UploadFrequency,
    pub batch_processing_level: BatchProcessingLevel,
    /// Hex-encoded 32-byte key. When set, stored events are encrypted at rest.
    pub encryption_key: Option<String>,
    /// Consent in effect when the SDK starts
    pub tracking_consent: TrackingConsent,
    /// Deflate request bodies of features that support it
    pub upload_compression: bool,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            client_token: String::new(),
            env: "prod".to_string(),
            service: "spool".to_string(),
            version: "0.0.0".to_string(),
            site: Site::default(),
            storage_dir: PathBuf::from("./spool-data"),
            instance_name: "main".to_string(),
            batch_size: BatchSize::default(),
            upload_frequency: UploadFrequency::default(),
            batch_processing_level: BatchProcessingLevel::default(),
            encryption_key: None,
            tracking_consent: TrackingConsent::default(),
            upload_compression: true,
        }
    }
}

impl SdkConfig {
    /// Create a configuration with a client token and defaults everywhere else
    pub fn new(client_token: impl Into<String>) -> Self {
        Self {
            client_token: client_token.into(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_site(mut self, site: Site) -> Self {
        self.site = site;
        self
    }

    pub fn with_storage_dir(mut self, storage_dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = storage_dir.into();
        self
    }

    pub fn with_instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = instance_name.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: BatchSize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_upload_frequency(mut self, upload_frequency: UploadFrequency) -> Self {
        self.upload_frequency = upload_frequency;
        self
    }

    pub fn with_batch_processing_level(mut self, level: BatchProcessingLevel) -> Self {
        self.batch_processing_level = level;
        self
    }

    /// Encrypt stored events with `key`
    pub fn with_encryption_key(mut self, key: &[u8; STORAGE_KEY_SIZE]) -> Self {
        self.encryption_key = Some(hex::encode(key));
        self
    }

    pub fn with_tracking_consent(mut self, consent: TrackingConsent) -> Self {
        self.tracking_consent = consent;
        self
    }

    pub fn with_upload_compression(mut self, enabled: bool) -> Self {
        self.upload_compression = enabled;
        self
    }

    /// Check the configuration can start an SDK
    pub fn validate(&self) -> SdkResult<()> {
        if self.client_token.trim().is_empty() {
            return Err(SdkError::Config("client token must not be empty".to_string()));
        }
        if self.instance_name.is_empty()
            || self
                .instance_name
                .chars()
                .any(|c| std::path::is_separator(c) || c == '.')
        {
            return Err(SdkError::Config(format!(
                "invalid instance name: {:?}",
                self.instance_name
            )));
        }
        self.encryption()?;
        Ok(())
    }

    /// Performance preset shared by all features before overrides
    pub fn performance_preset(&self) -> PerformancePreset {
        PerformancePreset::new(self.batch_size, self.upload_frequency, self.batch_processing_level)
    }

    /// At-rest encryption built from `encryption_key`, if one is set
    pub fn encryption(&self) -> SdkResult<Option<AtRestEncryption>> {
        let Some(encoded) = &self.encryption_key else {
            return Ok(None);
        };
        let key = hex::decode(encoded)
            .map_err(|e| SdkError::Config(format!("encryption key is not valid hex: {}", e)))?;
        Ok(Some(AtRestEncryption::from_slice(&key)?))
    }

    /// Directory holding this instance's feature directories
    pub fn instance_dir(&self) -> PathBuf {
        self.storage_dir.join(&self.instance_name)
    }

    /// Context the SDK starts with
    pub fn initial_context(&self) -> SdkContext {
        SdkContext {
            site: self.site,
            client_token: self.client_token.clone(),
            service: self.service.clone(),
            env: self.env.clone(),
            version: self.version.clone(),
            tracking_consent: self.tracking_consent,
            ..SdkContext::default()
        }
    }
}
