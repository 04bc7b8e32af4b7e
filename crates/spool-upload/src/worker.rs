//! Periodic upload of one feature's stored batches

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use spool_core::{SdkContext, Telemetry};
use spool_storage::{Batch, FeatureStorage, RemovalReason};

use crate::conditions::{UploadConditions, describe_blockers};
use crate::delay::{UploadDelay, UploadPreset};
use crate::error::{UploadError, UploadResult};
use crate::status::{UploadStatus, UploadStatusError};
use crate::uploader::DataUploader;

/// Everything one upload cycle needs. Shared between the scheduled task
/// and callers of [`DataUploadWorker::flush`].
struct UploadCycle {
    feature_name: String,
    storage: FeatureStorage,
    uploader: DataUploader,
    conditions: Arc<dyn UploadConditions>,
    context: watch::Receiver<SdkContext>,
    max_batches_per_upload: usize,
    telemetry: Arc<dyn Telemetry>,
    /// Held for the duration of a cycle or a flush, so they never overlap
    delay: tokio::sync::Mutex<UploadDelay>,
}

impl UploadCycle {
    fn context(&self) -> SdkContext {
        self.context.borrow().clone()
    }

    async fn run(&self) -> Duration {
        let mut delay = self.delay.lock().await;
        let context = self.context();

        let blockers = self.conditions.blockers_for_upload(&context);
        let batches = if blockers.is_empty() {
            self.storage
                .read_batches(self.max_batches_per_upload)
                .await
                .unwrap_or_else(|e| {
                    self.telemetry.error("Failed to read batches", Some(&e));
                    Vec::new()
                })
        } else {
            Vec::new()
        };

        if batches.is_empty() {
            debug!(
                feature = %self.feature_name,
                conditions = %describe_blockers(&blockers),
                "No upload"
            );
        }

        let mut all_succeeded = false;
        let mut batches = batches.into_iter();
        for batch in batches.by_ref() {
            if batch.is_empty() {
                self.storage.mark_batch_as_read(batch, RemovalReason::Invalid);
                continue;
            }

            debug!(feature = %self.feature_name, events = batch.events.len(), "Uploading batch");
            match self.uploader.upload(&batch.events, &context).await {
                Ok(status) => {
                    if status.needs_retry {
                        debug!(feature = %self.feature_name, %status, "Not delivered, will be retransmitted");
                        self.storage.release_batch(batch);
                    } else {
                        debug!(feature = %self.feature_name, %status, "Accepted, won't be retransmitted");
                        all_succeeded = true;
                        let code = status.response_code.unwrap_or_default();
                        self.storage.mark_batch_as_read(batch, RemovalReason::IntakeCode(code));
                    }

                    if let Some(error) = &status.error {
                        all_succeeded = false;
                        self.report(error, &status);
                        break;
                    }
                }
                Err(e) => {
                    self.storage.mark_batch_as_read(batch, RemovalReason::Invalid);
                    self.telemetry.error(
                        &format!("Failed to initiate '{}' data upload", self.feature_name),
                        Some(&e),
                    );
                }
            }
        }
        // Cut short by an error; try the rest next cycle
        for batch in batches {
            self.storage.release_batch(batch);
        }

        if all_succeeded {
            delay.decrease();
        } else {
            delay.increase();
        }
        delay.current()
    }

    fn report(&self, error: &UploadStatusError, status: &UploadStatus) {
        match error {
            UploadStatusError::Unauthorized { .. } => warn!(
                feature = %self.feature_name,
                %status,
                "Upload unauthorized, make sure the client token is valid for the configured site"
            ),
            UploadStatusError::HttpError { status_code } => self
                .telemetry
                .error(&format!("Data upload finished with status code: {status_code}"), None),
            UploadStatusError::NetworkError { message } => self
                .telemetry
                .error(&format!("Data upload finished with error: {message}"), None),
        }
    }

    async fn flush(&self) -> UploadResult<()> {
        let _cycle = self.delay.lock().await;
        let context = self.context();

        let batches: Vec<Batch> = self.storage.read_all_batches().await?;
        for batch in batches {
            if !batch.is_empty() {
                let first = self.uploader.upload(&batch.events, &context).await;
                let failed = match &first {
                    Ok(status) => matches!(status.error, Some(UploadStatusError::NetworkError { .. })),
                    Err(_) => true,
                };
                if failed {
                    let _ = self.uploader.upload(&batch.events, &context).await;
                }
            }
            self.storage.mark_batch_as_read(batch, RemovalReason::Flushed);
        }
        self.storage.flush_async().await?;
        Ok(())
    }
}

/// Uploads one feature's data on a backoff schedule.
///
/// Each cycle waits for the current delay, checks upload conditions,
/// reads up to `max_batches_per_upload` batches and uploads them one at a
/// time. Accepted batches are deleted, retryable ones are released for a
/// later cycle. A cycle where every upload was accepted shortens the
/// delay; anything else lengthens it.
pub struct DataUploadWorker {
    cycle: Arc<UploadCycle>,
    shutdown_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DataUploadWorker {
    /// Create a worker. Nothing is scheduled until [`start`](Self::start).
    pub fn new(
        feature_name: impl Into<String>,
        storage: FeatureStorage,
        uploader: DataUploader,
        conditions: Arc<dyn UploadConditions>,
        context: watch::Receiver<SdkContext>,
        preset: &UploadPreset,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            cycle: Arc::new(UploadCycle {
                feature_name: feature_name.into(),
                storage,
                uploader,
                conditions,
                context,
                max_batches_per_upload: preset.max_batches_per_upload.max(1),
                telemetry,
                delay: tokio::sync::Mutex::new(UploadDelay::new(preset)),
            }),
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn feature_name(&self) -> &str {
        &self.cycle.feature_name
    }

    /// Start scheduling upload cycles on the current tokio runtime
    pub fn start(&self) -> UploadResult<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| UploadError::NoRuntime)?;
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Ok(());
        }
        let cycle = self.cycle.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        *handle = Some(runtime.spawn(run(cycle, shutdown_rx)));
        Ok(())
    }

    /// Run one upload cycle right away and return the delay before the next
    pub async fn upload_now(&self) -> Duration {
        self.cycle.run().await
    }

    pub async fn current_delay(&self) -> Duration {
        self.cycle.delay.lock().await.current()
    }

    /// Upload everything stored, regardless of age and upload conditions.
    ///
    /// Each batch is sent once, with one more attempt if no response was
    /// received, and deleted whatever the outcome.
    #[instrument(skip_all, fields(feature = %self.cycle.feature_name))]
    pub async fn flush(&self) -> UploadResult<()> {
        self.cycle.flush().await
    }

    /// Stop scheduling uploads. An upload in progress completes first.
    pub async fn cancel(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(feature = %self.cycle.feature_name, error = %e, "Upload task ended abnormally");
            }
        }
    }
}

async fn run(cycle: Arc<UploadCycle>, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(feature = %cycle.feature_name, "Upload worker started");
    let mut next = cycle.delay.lock().await.current();
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(feature = %cycle.feature_name, "Upload worker shutting down");
                break;
            }
            _ = tokio::time::sleep(next) => {
                next = cycle.run().await;
            }
        }
    }
}
