//! Structured logging setup for Spool
//!
//! Every Spool crate logs through `tracing`. This crate installs a
//! subscriber for hosts that do not bring their own.
//!
//! # Features
//!
//! - **JSONL Output**: structured JSON lines for log aggregation (default)
//! - **Pretty Output**: human-readable console output for development
//! - **File Rotation**: daily/hourly log rotation via tracing-appender
//! - **Per-component levels**: e.g. trace `spool_storage` while the rest stays at warn
//!
//! # Quick Start
//!
//! ```ignore
//! use spool_logging::{Component, LogConfig, SpoolSubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = SpoolSubscriberBuilder::new().init();
//!
//! // Development mode with pretty human-readable output
//! let _guard = SpoolSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//!
//! // Only the upload pipeline, in detail
//! let _guard = SpoolSubscriberBuilder::new()
//!     .with_config(LogConfig::focused(Component::Upload))
//!     .init();
//! ```

pub mod config;
pub mod layers;

pub use config::{Component, ConsoleFormat, FileConfig, JsonlConfig, LogConfig, RotationStrategy, TELEMETRY_TARGET};
pub use layers::{BoxedLayer, console_layer, file_writer, jsonl_layer};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to prepare log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create rolling log file: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Builder for configuring and installing the global subscriber
pub struct SpoolSubscriberBuilder {
    config: LogConfig,
}

impl SpoolSubscriberBuilder {
    /// Default configuration: JSONL to console
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Override the level of one Spool component
    pub fn with_component_level(mut self, component: Component, level: impl Into<String>) -> Self {
        self.config.components.insert(component, level.into());
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level));
        for directive in self.config.directives() {
            filter = filter.add_directive(directive.parse()?);
        }
        Ok(filter)
    }

    /// Install the subscriber globally.
    ///
    /// Returns the guard of the file writer, if file output is configured;
    /// keep it alive for as long as logs should reach the file.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = self.env_filter()?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if let Some(layer) = console_layer(self.config.console, self.config.ansi, &self.config.jsonl) {
            layers.push(layer);
        }
        let mut guard = None;
        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(jsonl_layer(writer, &self.config.jsonl));
            guard = Some(file_guard);
        }

        Registry::default().with(layers).with(env_filter).try_init()?;
        Ok(guard)
    }

    /// Like [`try_init`](Self::try_init), reporting failures on stderr
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: logging not initialized: {e}");
                None
            }
        }
    }
}

impl Default for SpoolSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    SpoolSubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    SpoolSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for tests. Safe to call from every test.
pub fn init_testing() {
    let _ = SpoolSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
