//! Core types and traits for Spool
//!
//! This crate holds the vocabulary shared by every other Spool crate:
//!
//! - [`Event`]: an opaque payload plus optional metadata, as handed over by a feature
//! - [`Writer`]: the non-blocking sink features write events into
//! - [`TrackingConsent`]: the user's consent state, which decides where data lands
//! - [`SdkContext`]: an immutable snapshot of everything needed to build uploads
//! - [`DateProvider`]: wall-clock abstraction so file ages are testable
//! - [`Telemetry`]: the logging and metrics capability injected into components
//! - [`DataEncryption`]: the optional at-rest encryption seam
//!
//! ## Example
//!
//! ```ignore
//! use spool_core::{Event, Writer, WriterExt};
//!
//! fn log_message(writer: &dyn Writer) {
//!     writer.write(Event::new(br#"{"message":"hello"}"#.to_vec()));
//!     writer.write_value(&serde_json::json!({ "message": "world" }), None::<&()>);
//! }
//! ```

pub mod consent;
pub mod context;
pub mod date;
pub mod encryption;
pub mod error;
pub mod event;
pub mod format;
pub mod telemetry;
pub mod writer;

pub use consent::TrackingConsent;
pub use context::{DeviceInfo, SdkContext, Site};
pub use date::{DateProvider, ManualDateProvider, SystemDateProvider};
pub use encryption::DataEncryption;
pub use error::{EncodingError, EncryptionError};
pub use event::Event;
pub use format::DataFormat;
pub use telemetry::{
    MetricAttributes, NopTelemetry, RecordingTelemetry, Telemetry, TelemetryRecord,
    TracingTelemetry,
};
pub use writer::{NopWriter, Writer, WriterExt};
