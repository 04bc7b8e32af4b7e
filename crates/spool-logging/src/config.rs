//! Logging presets for hosts embedding Spool
//!
//! Spool logs under one target per crate plus [`TELEMETRY_TARGET`] for the
//! SDK's own error and metric reports. A [`LogConfig`] sets a base level and
//! tunes these [`Component`]s on top of it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Target used by the SDK's internal telemetry reports
pub const TELEMETRY_TARGET: &str = "spool::telemetry";

/// Part of Spool whose verbosity can be tuned on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Core,
    Storage,
    Upload,
    Sdk,
    /// Error and metric reports, see [`TELEMETRY_TARGET`]
    Telemetry,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Core,
        Component::Storage,
        Component::Upload,
        Component::Sdk,
        Component::Telemetry,
    ];

    /// `tracing` target the component logs under
    pub fn target(self) -> &'static str {
        match self {
            Component::Core => "spool_core",
            Component::Storage => "spool_storage",
            Component::Upload => "spool_upload",
            Component::Sdk => "spool_sdk",
            Component::Telemetry => TELEMETRY_TARGET,
        }
    }
}

/// What goes to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleFormat {
    Off,
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    #[default]
    Jsonl,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level, replaced by `RUST_LOG` when set
    pub level: String,
    pub console: ConsoleFormat,
    /// Colored pretty output
    pub ansi: bool,
    /// Rolling JSONL files
    pub file: Option<FileConfig>,
    pub jsonl: JsonlConfig,
    /// Levels applied on top of the base level
    pub components: BTreeMap<Component, String>,
    /// Levels for targets outside Spool, e.g. `reqwest`
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Jsonl,
            ansi: false,
            file: None,
            jsonl: JsonlConfig::default(),
            components: BTreeMap::new(),
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Pretty console output with the storage and upload pipelines at debug
    pub fn development() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Pretty,
            ansi: true,
            ..Default::default()
        }
        .with_component(Component::Storage, "debug")
        .with_component(Component::Upload, "debug")
        .with_component(Component::Telemetry, "debug")
    }

    /// Daily JSONL files under `log_dir`, no console.
    ///
    /// Per-write storage messages stay off; telemetry reports are kept.
    pub fn production(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Off,
            file: Some(FileConfig::daily(log_dir)),
            ..Default::default()
        }
        .with_component(Component::Storage, "warn")
        .with_component(Component::Telemetry, "info")
    }

    /// Warnings only, written without color so test output stays readable
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            console: ConsoleFormat::Pretty,
            ..Default::default()
        }
    }

    /// Everything one component does, warnings from the rest
    pub fn focused(component: Component) -> Self {
        Self {
            level: "warn".to_string(),
            console: ConsoleFormat::Pretty,
            ..Default::default()
        }
        .with_component(component, "trace")
    }

    pub fn with_component(mut self, component: Component, level: impl Into<String>) -> Self {
        self.components.insert(component, level.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// `target=level` filter directives, components first
    pub fn directives(&self) -> Vec<String> {
        self.components
            .iter()
            .map(|(component, level)| format!("{}={level}", component.target()))
            .chain(self.targets.iter().map(|(target, level)| format!("{target}={level}")))
            .collect()
    }
}

/// Rolling log files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Older files beyond this count are removed on rotation
    pub max_files: Option<usize>,
}

impl FileConfig {
    /// `spool.<date>.log` files, a month of them kept
    pub fn daily(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "spool".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(30),
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            max_files: Some(7),
            ..Self::daily("./logs")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// Single file, truncated on start
    Never,
}

/// Fields included in JSON lines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Event fields at the root of the object instead of under `fields`
    pub flatten_events: bool,
    pub include_spans: bool,
    pub include_location: bool,
    pub include_thread_info: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
            include_thread_info: true,
        }
    }
}
