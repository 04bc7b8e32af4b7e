//! Delay between upload cycles

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upload timing parameters of one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UploadPreset {
    /// Delay before the first upload cycle
    pub initial_delay: Duration,
    /// Lower bound of the delay
    pub min_delay: Duration,
    /// Upper bound of the delay
    pub max_delay: Duration,
    /// Fraction the delay changes by after each cycle
    pub change_rate: f64,
    /// Batches uploaded in one cycle at most
    pub max_batches_per_upload: usize,
}

impl UploadPreset {
    /// Preset derived from the shortest delay between two uploads.
    ///
    /// Starts at 5x, never goes below 1x or above 10x `min_delay` and moves
    /// by 10% per cycle.
    pub fn with_min_delay(min_delay: Duration) -> Self {
        Self {
            initial_delay: min_delay.mul_f64(5.0),
            min_delay,
            max_delay: min_delay.mul_f64(10.0),
            change_rate: 0.1,
            max_batches_per_upload: 1,
        }
    }

    pub fn with_max_batches_per_upload(mut self, max_batches_per_upload: usize) -> Self {
        self.max_batches_per_upload = max_batches_per_upload;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_delay_bounds(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_change_rate(mut self, change_rate: f64) -> Self {
        self.change_rate = change_rate;
        self
    }
}

impl Default for UploadPreset {
    fn default() -> Self {
        Self::with_min_delay(Duration::from_secs(2))
    }
}

/// Mutable upload delay, bounded by `[min, max]`
#[derive(Debug, Clone, PartialEq)]
pub struct UploadDelay {
    current: Duration,
    min: Duration,
    max: Duration,
    change_rate: f64,
}

impl UploadDelay {
    pub fn new(preset: &UploadPreset) -> Self {
        Self {
            current: preset.initial_delay,
            min: preset.min_delay,
            max: preset.max_delay,
            change_rate: preset.change_rate,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Shorten the delay after a cycle where every upload was accepted
    pub fn decrease(&mut self) {
        self.current = self.current.mul_f64(1.0 - self.change_rate).max(self.min);
    }

    /// Lengthen the delay after a cycle with nothing to send or a failure
    pub fn increase(&mut self) {
        self.current = self.current.mul_f64(1.0 + self.change_rate).min(self.max);
    }
}
