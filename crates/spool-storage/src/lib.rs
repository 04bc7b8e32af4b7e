//! On-device persistence for Spool
//!
//! Events written by features are framed as TLV blocks and appended to
//! time-named files. Files rotate on size, age and write count, and are
//! read back oldest first once they are old enough to be complete.
//!
//! ## Features
//!
//! - **TLV blocks**: forward-compatible framing that tolerates truncated tails
//! - **File rotation**: size, age and object-count limits per file
//! - **Retention**: directory size cap and obsolete-file deletion
//! - **Tracking consent**: pending data kept aside until consent is known
//! - **Serial queue**: all disk work for a feature on one background thread
//! - **Encryption at rest**: optional per-block [`DataEncryption`](spool_core::DataEncryption)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use spool_core::{Event, SystemDateProvider, TracingTelemetry, TrackingConsent};
//! use spool_storage::{Directory, FeatureStorage, FeatureStorageConfig};
//!
//! let root = Directory::create("./spool-data")?;
//! let storage = FeatureStorage::open(
//!     &root,
//!     FeatureStorageConfig::new("logs"),
//!     Arc::new(SystemDateProvider),
//!     Arc::new(TracingTelemetry),
//! )?;
//!
//! storage.writer(TrackingConsent::Granted).write(Event::new(br#"{"message":"hi"}"#.to_vec()));
//! let batches = storage.read_batches(10).await?;
//! ```

pub mod block;
pub mod directory;
pub mod error;
pub mod file;
pub mod orchestrator;
pub mod preset;
pub mod queue;
pub mod reader;
pub mod storage;
pub mod writer;

pub use block::{BlockType, DataBlock, DataBlockReader, DEFAULT_MAX_BLOCK_LENGTH};
pub use directory::{Directory, retry};
pub use error::{BlockError, StorageError};
pub use file::File;
pub use orchestrator::{
    BATCH_CLOSED_METRIC, BATCH_DELETED_METRIC, FilesOrchestrator, MetricsData, RemovalReason,
};
pub use preset::{ReadableFileConditions, StoragePreset, WritableFileConditions};
pub use queue::SerialQueue;
pub use reader::{Batch, FileReader};
pub use storage::{
    AUTHORIZED_DIRECTORY, FeatureStorage, FeatureStorageConfig, StorageState,
    UNAUTHORIZED_DIRECTORY, WriteTarget,
};
pub use writer::FileWriter;
