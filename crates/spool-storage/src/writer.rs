//! Persisting events into orchestrated files

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use spool_core::{DataEncryption, Event, Telemetry};

use crate::block::DataBlock;
use crate::error::StorageError;
use crate::file::File;
use crate::orchestrator::FilesOrchestrator;

/// Frames events as TLV blocks and appends them to the orchestrator's
/// current file.
///
/// Every failure drops the event: it is reported through telemetry and
/// never retried. A write either lands completely or not at all.
pub struct FileWriter {
    encryption: Option<Arc<dyn DataEncryption>>,
    telemetry: Arc<dyn Telemetry>,
    force_new_file: bool,
}

impl FileWriter {
    pub fn new(telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            encryption: None,
            telemetry,
            force_new_file: false,
        }
    }

    /// Encrypt every block before it is written
    pub fn with_encryption(mut self, encryption: Arc<dyn DataEncryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Put every event in its own file
    pub fn with_forced_new_file(mut self, force_new_file: bool) -> Self {
        self.force_new_file = force_new_file;
        self
    }

    /// Persist `event`, reporting and dropping it on failure
    pub fn write(&self, orchestrator: &mut FilesOrchestrator, event: &Event) {
        if let Err(e) = self.try_write(orchestrator, event) {
            self.telemetry.error("Failed to write data", Some(&e));
        }
    }

    /// Persist `event` and return the file it landed in
    pub fn try_write(&self, orchestrator: &mut FilesOrchestrator, event: &Event) -> Result<File, StorageError> {
        let framed = self.frame(event)?;
        let write_size = framed.len() as u64;

        let file = if self.force_new_file {
            orchestrator.get_new_writable_file(write_size)?
        } else {
            orchestrator.get_writable_file(write_size)?
        };
        file.append(&framed)?;
        trace!(file = file.name(), bytes = write_size, "Event written");
        Ok(file)
    }

    /// `[metadata block] event block`, each payload encrypted if configured
    fn frame(&self, event: &Event) -> Result<Bytes, StorageError> {
        let mut framed = BytesMut::new();
        if let Some(metadata) = &event.metadata {
            DataBlock::metadata(self.encrypt(metadata)?).serialize_into(&mut framed)?;
        }
        DataBlock::event(self.encrypt(&event.data)?).serialize_into(&mut framed)?;
        Ok(framed.freeze())
    }

    fn encrypt(&self, data: &Bytes) -> Result<Bytes, StorageError> {
        match &self.encryption {
            Some(encryption) => Ok(Bytes::from(encryption.encrypt(data)?)),
            None => Ok(data.clone()),
        }
    }
}
