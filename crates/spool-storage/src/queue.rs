//! Serial execution context for storage work
//!
//! Each feature storage owns one [`SerialQueue`]: a dedicated thread that
//! owns the storage state and runs submitted jobs one at a time, in
//! submission order. Producers only push onto an unbounded channel, so
//! they never wait for disk I/O.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::StorageError;

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Handle to a serial queue owning state of type `S`.
///
/// Handles are cheap to clone. The worker thread stops once every handle
/// is dropped and the remaining jobs have run.
pub struct SerialQueue<S> {
    label: Arc<str>,
    sender: mpsc::UnboundedSender<Job<S>>,
}

impl<S> Clone for SerialQueue<S> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<S: Send + 'static> SerialQueue<S> {
    /// Start a worker thread named `label` that owns `state`
    pub fn spawn(label: impl Into<String>, state: S) -> Result<Self, StorageError> {
        let label: Arc<str> = Arc::from(label.into());
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job<S>>();

        let worker_label = label.clone();
        thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                let mut state = state;
                while let Some(job) = receiver.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(|| job(&mut state))).is_err() {
                        error!(queue = %worker_label, "Storage job panicked");
                    }
                }
                debug!(queue = %worker_label, "Storage queue stopped");
            })?;

        Ok(Self { label, sender })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Enqueue `job` without waiting for it
    pub fn dispatch(&self, job: impl FnOnce(&mut S) + Send + 'static) {
        if self.sender.send(Box::new(job)).is_err() {
            warn!(queue = %self.label, "Storage queue closed, job dropped");
        }
    }

    /// Run `job` and block the calling thread until it returns.
    ///
    /// Must not be called from a job running on the same queue.
    pub fn sync<R: Send + 'static>(&self, job: impl FnOnce(&mut S) -> R + Send + 'static) -> Result<R, StorageError> {
        let (tx, rx) = std_mpsc::sync_channel(1);
        self.sender
            .send(Box::new(move |state: &mut S| {
                let _ = tx.send(job(state));
            }))
            .map_err(|_| self.closed())?;
        rx.recv().map_err(|_| self.closed())
    }

    /// Run `job` and wait for its result without blocking the runtime
    pub async fn run<R: Send + 'static>(
        &self,
        job: impl FnOnce(&mut S) -> R + Send + 'static,
    ) -> Result<R, StorageError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Box::new(move |state: &mut S| {
                let _ = tx.send(job(state));
            }))
            .map_err(|_| self.closed())?;
        rx.await.map_err(|_| self.closed())
    }

    /// Block until every job submitted so far has run
    pub fn flush(&self) -> Result<(), StorageError> {
        self.sync(|_| ())
    }

    fn closed(&self) -> StorageError {
        StorageError::QueueClosed(self.label.to_string())
    }
}
