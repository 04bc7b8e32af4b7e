//! Consent-aware storage for one feature
//!
//! Every feature stores data under its own directory:
//!
//! ```text
//! <root>/<feature>/v2               data that may be uploaded
//! <root>/<feature>/intermediate-v2  data collected while consent is pending
//! ```
//!
//! Both directories, their orchestrators, the file writer and the file
//! reader live on the feature's [`SerialQueue`]. Nothing outside the queue
//! touches them.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument};

use spool_core::{
    DataEncryption, DateProvider, Event, NopWriter, SdkContext, Telemetry, TrackingConsent, Writer,
};

use crate::directory::Directory;
use crate::error::StorageError;
use crate::orchestrator::{FilesOrchestrator, MetricsData, RemovalReason};
use crate::preset::StoragePreset;
use crate::queue::SerialQueue;
use crate::reader::{Batch, FileReader};
use crate::writer::FileWriter;

/// Directory holding data that may be uploaded
pub const AUTHORIZED_DIRECTORY: &str = "v2";
/// Directory holding data collected while consent is pending
pub const UNAUTHORIZED_DIRECTORY: &str = "intermediate-v2";

/// Configuration for a feature's storage
#[derive(Clone)]
pub struct FeatureStorageConfig {
    /// Feature name, also the directory name
    pub feature_name: String,
    /// File thresholds
    pub preset: StoragePreset,
    /// Optional at-rest encryption
    pub encryption: Option<Arc<dyn DataEncryption>>,
    /// Put every event in its own file
    pub force_new_file: bool,
    /// Batch metric information for the authorized directory
    pub metrics: Option<MetricsData>,
}

impl FeatureStorageConfig {
    pub fn new(feature_name: impl Into<String>) -> Self {
        Self {
            feature_name: feature_name.into(),
            preset: StoragePreset::default(),
            encryption: None,
            force_new_file: false,
            metrics: None,
        }
    }

    pub fn with_preset(mut self, preset: StoragePreset) -> Self {
        self.preset = preset;
        self
    }

    pub fn with_encryption(mut self, encryption: Arc<dyn DataEncryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn with_forced_new_file(mut self, force_new_file: bool) -> Self {
        self.force_new_file = force_new_file;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsData) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Which directory a write goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Authorized,
    Unauthorized,
}

impl WriteTarget {
    /// Directory for data collected under `consent`, `None` when it is dropped
    pub fn for_consent(consent: TrackingConsent) -> Option<Self> {
        match consent {
            TrackingConsent::Granted => Some(WriteTarget::Authorized),
            TrackingConsent::Pending => Some(WriteTarget::Unauthorized),
            TrackingConsent::NotGranted => None,
        }
    }
}

/// State owned by the feature's queue
pub struct StorageState {
    authorized: FilesOrchestrator,
    unauthorized: FilesOrchestrator,
    writer: FileWriter,
    reader: FileReader,
}

impl StorageState {
    fn write(&mut self, target: WriteTarget, event: &Event) {
        let orchestrator = match target {
            WriteTarget::Authorized => &mut self.authorized,
            WriteTarget::Unauthorized => &mut self.unauthorized,
        };
        self.writer.write(orchestrator, event);
    }

    fn clear_unauthorized(&mut self, telemetry: &dyn Telemetry) {
        if let Err(e) = self.unauthorized.directory().delete_all_files() {
            telemetry.error("Failed to clear unauthorized data", Some(&e));
        }
    }

    fn clear_all(&mut self, telemetry: &dyn Telemetry) {
        for orchestrator in [&self.authorized, &self.unauthorized] {
            if let Err(e) = orchestrator.directory().delete_all_files() {
                telemetry.error("Failed to clear data", Some(&e));
            }
        }
        self.reader.release_all();
    }

    /// Orchestrator for data that may be uploaded
    pub fn authorized(&mut self) -> &mut FilesOrchestrator {
        &mut self.authorized
    }

    /// Orchestrator for data collected while consent is pending
    pub fn unauthorized(&mut self) -> &mut FilesOrchestrator {
        &mut self.unauthorized
    }
}

/// Writer bound to one directory of a feature
struct StorageWriter {
    queue: SerialQueue<StorageState>,
    target: WriteTarget,
}

impl Writer for StorageWriter {
    fn write(&self, event: Event) {
        let target = self.target;
        self.queue.dispatch(move |state| state.write(target, &event));
    }
}

/// Writer following the consent of a shared context.
///
/// Consent is read when the write runs on the queue, so a write queued
/// before a consent change is ordered against the migration that change
/// triggers.
struct ContextWriter {
    queue: SerialQueue<StorageState>,
    context: watch::Receiver<SdkContext>,
}

impl Writer for ContextWriter {
    fn write(&self, event: Event) {
        let context = self.context.clone();
        self.queue.dispatch(move |state| {
            let consent = context.borrow().tracking_consent;
            if let Some(target) = WriteTarget::for_consent(consent) {
                state.write(target, &event);
            }
        });
    }
}

/// Storage of one feature
#[derive(Clone)]
pub struct FeatureStorage {
    feature_name: Arc<str>,
    queue: SerialQueue<StorageState>,
    telemetry: Arc<dyn Telemetry>,
}

impl FeatureStorage {
    /// Open the feature's directories under `root` and start its queue.
    ///
    /// Data left in the pending-consent directory by a previous run is
    /// cleared: consent for it can no longer be established.
    #[instrument(skip_all, fields(feature = %config.feature_name))]
    pub fn open(
        root: &Directory,
        config: FeatureStorageConfig,
        date_provider: Arc<dyn DateProvider>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Result<Self, StorageError> {
        let feature_directory = root.create_subdirectory(&config.feature_name)?;
        let authorized_directory = feature_directory.create_subdirectory(AUTHORIZED_DIRECTORY)?;
        let unauthorized_directory = feature_directory.create_subdirectory(UNAUTHORIZED_DIRECTORY)?;

        let mut authorized = FilesOrchestrator::new(
            authorized_directory,
            config.preset,
            date_provider.clone(),
            telemetry.clone(),
        );
        if let Some(metrics) = config.metrics.clone() {
            authorized = authorized.with_metrics(metrics);
        }
        let unauthorized = FilesOrchestrator::new(
            unauthorized_directory,
            config.preset,
            date_provider,
            telemetry.clone(),
        );

        let mut writer = FileWriter::new(telemetry.clone()).with_forced_new_file(config.force_new_file);
        let mut reader = FileReader::new(telemetry.clone());
        if let Some(encryption) = &config.encryption {
            writer = writer.with_encryption(encryption.clone());
            reader = reader.with_encryption(encryption.clone());
        }

        let state = StorageState {
            authorized,
            unauthorized,
            writer,
            reader,
        };
        let queue = SerialQueue::spawn(format!("spool.storage.{}", config.feature_name), state)?;

        let storage = Self {
            feature_name: Arc::from(config.feature_name.as_str()),
            queue,
            telemetry,
        };
        storage.clear_unauthorized_data();
        info!(path = %feature_directory.path().display(), "Opened feature storage");
        Ok(storage)
    }

    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    /// Writer matching `consent`. Writes made through it are persisted in
    /// the order they were made.
    pub fn writer(&self, consent: TrackingConsent) -> Arc<dyn Writer> {
        let Some(target) = WriteTarget::for_consent(consent) else {
            return Arc::new(NopWriter);
        };
        Arc::new(StorageWriter {
            queue: self.queue.clone(),
            target,
        })
    }

    /// Writer following the tracking consent of `context` at the time each
    /// write is persisted
    pub fn context_writer(&self, context: watch::Receiver<SdkContext>) -> Arc<dyn Writer> {
        Arc::new(ContextWriter {
            queue: self.queue.clone(),
            context,
        })
    }

    /// Resolve pending data after consent changed to `consent`
    pub fn migrate_unauthorized_data(&self, consent: TrackingConsent) {
        let telemetry = self.telemetry.clone();
        self.queue.dispatch(move |state| match consent {
            TrackingConsent::Granted => {
                debug!("Moving pending data to the upload directory");
                let destination = state.authorized.directory().clone();
                if let Err(e) = state.unauthorized.directory().move_all_files(&destination) {
                    telemetry.error("Failed to migrate unauthorized data", Some(&e));
                }
            }
            TrackingConsent::NotGranted => state.clear_unauthorized(telemetry.as_ref()),
            TrackingConsent::Pending => {}
        });
    }

    /// Delete data collected while consent was pending
    pub fn clear_unauthorized_data(&self) {
        let telemetry = self.telemetry.clone();
        self.queue
            .dispatch(move |state| state.clear_unauthorized(telemetry.as_ref()));
    }

    /// Delete everything this feature stored
    pub fn clear_all_data(&self) {
        let telemetry = self.telemetry.clone();
        self.queue.dispatch(move |state| state.clear_all(telemetry.as_ref()));
    }

    /// Read files as soon as they exist, regardless of their age
    pub fn set_ignore_files_age_when_reading(&self, ignore: bool) {
        self.queue
            .dispatch(move |state| state.authorized.set_ignore_files_age_when_reading(ignore));
    }

    /// Read and claim up to `limit` batches ready for upload
    pub async fn read_batches(&self, limit: usize) -> Result<Vec<Batch>, StorageError> {
        self.queue
            .run(move |state| state.reader.read_batches(&mut state.authorized, limit))
            .await
    }

    /// Read and claim every stored batch, including the one still
    /// receiving writes and files too young for regular uploads
    pub async fn read_all_batches(&self) -> Result<Vec<Batch>, StorageError> {
        self.queue
            .run(|state| {
                state.authorized.close_writable_file();
                state.authorized.set_ignore_files_age_when_reading(true);
                let batches = state.reader.read_batches(&mut state.authorized, usize::MAX);
                state.authorized.set_ignore_files_age_when_reading(false);
                batches
            })
            .await
    }

    /// Delete an uploaded batch
    pub fn mark_batch_as_read(&self, batch: Batch, reason: RemovalReason) {
        self.queue
            .dispatch(move |state| state.reader.mark_batch_as_read(&mut state.authorized, &batch, reason));
    }

    /// Give a batch back so it is read again on a later cycle
    pub fn release_batch(&self, batch: Batch) {
        self.queue.dispatch(move |state| state.reader.release_batch(&batch));
    }

    /// Run `job` against the storage state on the feature queue
    pub async fn run<R: Send + 'static>(
        &self,
        job: impl FnOnce(&mut StorageState) -> R + Send + 'static,
    ) -> Result<R, StorageError> {
        self.queue.run(job).await
    }

    /// Block until every operation submitted so far has completed
    pub fn flush(&self) -> Result<(), StorageError> {
        self.queue.flush()
    }

    /// Wait until every operation submitted so far has completed
    pub async fn flush_async(&self) -> Result<(), StorageError> {
        self.queue.run(|_| ()).await
    }
}
