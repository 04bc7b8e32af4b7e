//! Wall-clock abstraction
//!
//! File names and file ages are derived from wall-clock time, so the
//! orchestrator asks a [`DateProvider`] instead of calling `Utc::now()`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of the current date
pub trait DateProvider: Send + Sync {
    /// Current UTC date
    fn now(&self) -> DateTime<Utc>;
}

/// Date provider backed by the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDateProvider;

impl DateProvider for SystemDateProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Date provider that only moves when told to
#[derive(Debug)]
pub struct ManualDateProvider {
    now: Mutex<DateTime<Utc>>,
}

impl ManualDateProvider {
    /// Start at the given date
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let Ok(delta) = chrono::Duration::from_std(by) else {
            return;
        };
        let mut now = self.now.lock();
        if let Some(advanced) = now.checked_add_signed(delta) {
            *now = advanced;
        }
    }

    /// Jump to an absolute date
    pub fn set(&self, date: DateTime<Utc>) {
        *self.now.lock() = date;
    }
}

impl Default for ManualDateProvider {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl DateProvider for ManualDateProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
