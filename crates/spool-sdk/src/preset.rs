//! Performance presets
//!
//! A [`PerformancePreset`] bundles the storage thresholds and upload timing
//! of one feature. It is derived from three coarse knobs: how big batches
//! grow ([`BatchSize`]), how often uploads are attempted
//! ([`UploadFrequency`]) and how many batches one cycle may send
//! ([`BatchProcessingLevel`]). Individual values can then be replaced with
//! a [`PerformancePresetOverride`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use spool_storage::StoragePreset;
use spool_upload::UploadPreset;

/// How long files collect events before they are uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl BatchSize {
    /// Mean age of a file when it gets uploaded
    pub fn mean_file_age(&self) -> Duration {
        match self {
            BatchSize::Small => Duration::from_secs(3),
            BatchSize::Medium => Duration::from_secs(10),
            BatchSize::Large => Duration::from_secs(35),
        }
    }
}

/// How often upload cycles run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UploadFrequency {
    Frequent,
    #[default]
    Average,
    Rare,
}

impl UploadFrequency {
    /// Shortest delay between two upload cycles
    pub fn min_upload_delay(&self) -> Duration {
        match self {
            UploadFrequency::Frequent => Duration::from_millis(500),
            UploadFrequency::Average => Duration::from_secs(2),
            UploadFrequency::Rare => Duration::from_secs(5),
        }
    }
}

/// How many batches a single upload cycle may send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchProcessingLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl BatchProcessingLevel {
    pub fn max_batches_per_upload(&self) -> usize {
        match self {
            BatchProcessingLevel::Low => 1,
            BatchProcessingLevel::Medium => 10,
            BatchProcessingLevel::High => 100,
        }
    }
}

/// Storage and upload tuning of one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformancePreset {
    pub storage: StoragePreset,
    pub upload: UploadPreset,
}

impl PerformancePreset {
    pub fn new(batch_size: BatchSize, upload_frequency: UploadFrequency, level: BatchProcessingLevel) -> Self {
        Self {
            storage: StoragePreset::with_mean_file_age(batch_size.mean_file_age()),
            upload: UploadPreset::with_min_delay(upload_frequency.min_upload_delay())
                .with_max_batches_per_upload(level.max_batches_per_upload()),
        }
    }

    /// Copy of this preset with every value set in `overrides` replaced
    pub fn updated(&self, overrides: &PerformancePresetOverride) -> Self {
        let mut storage = self.storage;
        if let Some(bytes) = overrides.max_file_size {
            storage = storage.with_max_file_size(bytes);
        }
        if let Some(bytes) = overrides.max_object_size {
            storage = storage.with_max_object_size(bytes);
        }
        if let Some(age) = overrides.max_file_age_for_write {
            storage = storage.with_max_file_age_for_write(age);
        }
        if let Some(age) = overrides.min_file_age_for_read {
            storage = storage.with_min_file_age_for_read(age);
        }
        if let Some(age) = overrides.max_file_age_for_read {
            storage = storage.with_max_file_age_for_read(age);
        }

        let mut upload = self.upload;
        if let Some(delay) = overrides.initial_upload_delay {
            upload = upload.with_initial_delay(delay);
        }
        upload = upload.with_delay_bounds(
            overrides.min_upload_delay.unwrap_or(upload.min_delay),
            overrides.max_upload_delay.unwrap_or(upload.max_delay),
        );
        if let Some(rate) = overrides.upload_delay_change_rate {
            upload = upload.with_change_rate(rate);
        }
        if let Some(count) = overrides.max_batches_per_upload {
            upload = upload.with_max_batches_per_upload(count);
        }

        Self { storage, upload }
    }
}

impl Default for PerformancePreset {
    fn default() -> Self {
        Self::new(
            BatchSize::default(),
            UploadFrequency::default(),
            BatchProcessingLevel::default(),
        )
    }
}

/// Per-feature replacements for [`PerformancePreset`] values.
///
/// Unset fields keep the value of the preset being updated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformancePresetOverride {
    pub max_file_size: Option<u64>,
    pub max_object_size: Option<u64>,
    pub max_file_age_for_write: Option<Duration>,
    pub min_file_age_for_read: Option<Duration>,
    pub max_file_age_for_read: Option<Duration>,
    pub initial_upload_delay: Option<Duration>,
    pub min_upload_delay: Option<Duration>,
    pub max_upload_delay: Option<Duration>,
    pub upload_delay_change_rate: Option<f64>,
    pub max_batches_per_upload: Option<usize>,
}

impl PerformancePresetOverride {
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = Some(bytes);
        self
    }

    pub fn with_max_object_size(mut self, bytes: u64) -> Self {
        self.max_object_size = Some(bytes);
        self
    }

    /// Sets both file age thresholds, keeping reads and writes on disjoint files
    pub fn with_file_ages(mut self, max_age_for_write: Duration, min_age_for_read: Duration) -> Self {
        self.max_file_age_for_write = Some(max_age_for_write);
        self.min_file_age_for_read = Some(min_age_for_read);
        self
    }

    pub fn with_max_file_age_for_read(mut self, age: Duration) -> Self {
        self.max_file_age_for_read = Some(age);
        self
    }

    pub fn with_upload_delays(mut self, initial: Duration, min: Duration, max: Duration) -> Self {
        self.initial_upload_delay = Some(initial);
        self.min_upload_delay = Some(min);
        self.max_upload_delay = Some(max);
        self
    }

    pub fn with_upload_delay_change_rate(mut self, rate: f64) -> Self {
        self.upload_delay_change_rate = Some(rate);
        self
    }

    pub fn with_max_batches_per_upload(mut self, count: usize) -> Self {
        self.max_batches_per_upload = Some(count);
        self
    }
}
