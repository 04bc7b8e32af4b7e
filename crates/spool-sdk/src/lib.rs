//! # Spool SDK
//!
//! Entry point of the Spool telemetry pipeline.
//!
//! [`SpoolCore`] ties together, per registered feature:
//! - Storage (consent-aware file directories on a serial queue)
//! - Upload (request building and a backoff-scheduled upload worker)
//!
//! ## Example
//!
//! ```rust,ignore
//! use spool_sdk::{FeatureConfig, SdkConfig, SpoolCore, TrackingConsent};
//!
//! let config = SdkConfig::new("client-token").with_storage_dir("./spool-data");
//! let core = SpoolCore::new(config)?;
//!
//! let logs = core.register_feature(FeatureConfig::logs(true))?;
//! logs.writer().write_value(&serde_json::json!({"message": "hello"}), None::<&()>)?;
//!
//! core.set_tracking_consent(TrackingConsent::Granted);
//! core.flush_and_tear_down().await?;
//! ```

mod config;
mod coordinator;
mod error;
mod feature;
pub mod preset;

pub use config::SdkConfig;
pub use coordinator::{SpoolCore, SpoolCoreBuilder};
pub use error::{SdkError, SdkResult};
pub use feature::{FeatureConfig, FeatureHandle};
pub use preset::{
    BatchProcessingLevel, BatchSize, PerformancePreset, PerformancePresetOverride, UploadFrequency,
};

pub use spool_core::{Event, SdkContext, Site, TrackingConsent, Writer, WriterExt};
