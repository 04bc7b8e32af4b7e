//! Storage thresholds
//!
//! All file rotation and retention decisions are driven by a
//! [`StoragePreset`]. The values are tuning knobs, not protocol: any
//! combination where `min_file_age_for_read > max_file_age_for_write`
//! keeps readers and writers on disjoint files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits deciding whether the last file can take one more write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritableFileConditions {
    /// Maximum size of a single file, in bytes
    pub max_file_size: u64,
    /// Files older than this stop receiving writes
    pub max_file_age_for_write: Duration,
    /// Maximum number of writes appended to one file
    pub max_objects_in_file: u64,
}

/// Limits deciding which files may be read for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadableFileConditions {
    /// Files younger than this are not read yet
    pub min_file_age_for_read: Duration,
    /// Files older than this are deleted instead of read
    pub max_file_age_for_read: Duration,
    /// Mirrors the write limit. Readers return every event of a file even
    /// when it holds more, so lowering the limit never drops stored data.
    pub max_objects_in_file: u64,
    /// Maximum size of a single write, and of a single block when reading
    pub max_object_size: u64,
}

/// Complete set of storage thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePreset {
    /// Total size above which the oldest files are purged
    pub max_directory_size: u64,
    pub writable: WritableFileConditions,
    pub readable: ReadableFileConditions,
}

impl StoragePreset {
    /// Thresholds derived from the mean age a file reaches before upload.
    ///
    /// Writes stop at 95% of `mean_file_age` and reads start at 105%.
    pub fn with_mean_file_age(mean_file_age: Duration) -> Self {
        let defaults = Self::default();
        Self {
            writable: WritableFileConditions {
                max_file_age_for_write: mean_file_age * 19 / 20,
                ..defaults.writable
            },
            readable: ReadableFileConditions {
                min_file_age_for_read: mean_file_age * 21 / 20,
                ..defaults.readable
            },
            ..defaults
        }
    }

    /// Average age of a file when it gets uploaded
    pub fn uploader_window(&self) -> Duration {
        (self.readable.min_file_age_for_read + self.writable.max_file_age_for_write) / 2
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.writable.max_file_size = bytes;
        self
    }

    pub fn with_max_directory_size(mut self, bytes: u64) -> Self {
        self.max_directory_size = bytes;
        self
    }

    pub fn with_max_object_size(mut self, bytes: u64) -> Self {
        self.readable.max_object_size = bytes;
        self
    }

    /// Sets how many writes one file takes before rotation
    pub fn with_max_objects_in_file(mut self, count: u64) -> Self {
        self.writable.max_objects_in_file = count;
        self.readable.max_objects_in_file = count;
        self
    }

    pub fn with_max_file_age_for_write(mut self, age: Duration) -> Self {
        self.writable.max_file_age_for_write = age;
        self
    }

    pub fn with_min_file_age_for_read(mut self, age: Duration) -> Self {
        self.readable.min_file_age_for_read = age;
        self
    }

    pub fn with_max_file_age_for_read(mut self, age: Duration) -> Self {
        self.readable.max_file_age_for_read = age;
        self
    }
}

impl Default for StoragePreset {
    fn default() -> Self {
        Self {
            max_directory_size: 512 * 1024 * 1024, // 512MB
            writable: WritableFileConditions {
                max_file_size: 4 * 1024 * 1024, // 4MB
                max_file_age_for_write: Duration::from_millis(9_500),
                max_objects_in_file: 500,
            },
            readable: ReadableFileConditions {
                min_file_age_for_read: Duration::from_millis(10_500),
                max_file_age_for_read: Duration::from_secs(18 * 60 * 60), // 18h
                max_objects_in_file: 500,
                max_object_size: 512 * 1024, // 512KB
            },
        }
    }
}
