//! Injected logging and metrics capability
//!
//! Components never reach for a global logger. They receive an
//! `Arc<dyn Telemetry>` at construction and report through it; hosts
//! usually pass [`TracingTelemetry`], tests pass [`RecordingTelemetry`].

use std::error::Error as StdError;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

/// Attributes attached to a metric
pub type MetricAttributes = Map<String, Value>;

/// Sink for SDK-internal diagnostics
pub trait Telemetry: Send + Sync {
    /// Report a diagnostic message
    fn debug(&self, message: &str);

    /// Report an error, optionally with its cause
    fn error(&self, message: &str, error: Option<&dyn StdError>);

    /// Report a named metric
    fn metric(&self, name: &str, attributes: MetricAttributes);
}

/// Forwards every report to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn debug(&self, message: &str) {
        debug!(target: "spool::telemetry", "{message}");
    }

    fn error(&self, message: &str, error: Option<&dyn StdError>) {
        match error {
            Some(cause) => error!(target: "spool::telemetry", error = %cause, "{message}"),
            None => error!(target: "spool::telemetry", "{message}"),
        }
    }

    fn metric(&self, name: &str, attributes: MetricAttributes) {
        let attributes = Value::Object(attributes);
        info!(target: "spool::telemetry", metric = name, attributes = %attributes, "Metric");
    }
}

/// Discards every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NopTelemetry;

impl Telemetry for NopTelemetry {
    fn debug(&self, _message: &str) {}

    fn error(&self, _message: &str, _error: Option<&dyn StdError>) {}

    fn metric(&self, _name: &str, _attributes: MetricAttributes) {}
}

/// A report captured by [`RecordingTelemetry`]
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryRecord {
    Debug(String),
    Error {
        message: String,
        error: Option<String>,
    },
    Metric {
        name: String,
        attributes: MetricAttributes,
    },
}

/// Keeps every report in memory for later assertions
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl RecordingTelemetry {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured reports, oldest first
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.lock().clone()
    }

    /// Messages of captured error reports
    pub fn error_messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|record| match record {
                TelemetryRecord::Error { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Attributes of every captured metric with the given name
    pub fn metrics(&self, name: &str) -> Vec<MetricAttributes> {
        self.records
            .lock()
            .iter()
            .filter_map(|record| match record {
                TelemetryRecord::Metric {
                    name: recorded,
                    attributes,
                } if recorded == name => Some(attributes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything captured so far
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Telemetry for RecordingTelemetry {
    fn debug(&self, message: &str) {
        self.records
            .lock()
            .push(TelemetryRecord::Debug(message.to_string()));
    }

    fn error(&self, message: &str, error: Option<&dyn StdError>) {
        self.records.lock().push(TelemetryRecord::Error {
            message: message.to_string(),
            error: error.map(|cause| cause.to_string()),
        });
    }

    fn metric(&self, name: &str, attributes: MetricAttributes) {
        self.records.lock().push(TelemetryRecord::Metric {
            name: name.to_string(),
            attributes,
        });
    }
}
