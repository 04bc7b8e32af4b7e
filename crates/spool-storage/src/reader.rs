//! Turning stored files back into batches of events

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use spool_core::{DataEncryption, DataFormat, Event, Telemetry};

use crate::block::{BlockType, DataBlockReader};
use crate::file::File;
use crate::orchestrator::{FilesOrchestrator, RemovalReason};

/// Events decoded from one file
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Decoded events, in write order
    pub events: Vec<Event>,
    /// File the events came from
    pub file: File,
}

impl Batch {
    /// Request body for this batch in the given wire format
    pub fn payload(&self, format: &DataFormat) -> Bytes {
        format.format_events(&self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Reads files handed out by a [`FilesOrchestrator`].
///
/// A file stays claimed from the moment its batch is read until it is
/// marked as read or released, and is not handed out twice meanwhile.
pub struct FileReader {
    encryption: Option<Arc<dyn DataEncryption>>,
    telemetry: Arc<dyn Telemetry>,
    claimed: HashSet<String>,
}

impl FileReader {
    pub fn new(telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            encryption: None,
            telemetry,
            claimed: HashSet::new(),
        }
    }

    /// Decrypt every block after reading it
    pub fn with_encryption(mut self, encryption: Arc<dyn DataEncryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Up to `limit` readable files that are not claimed by a batch
    pub fn read_files(&self, orchestrator: &mut FilesOrchestrator, limit: usize) -> Vec<File> {
        orchestrator.get_readable_files(&self.claimed, limit)
    }

    /// Read and claim the next readable file
    pub fn read_next_batch(&mut self, orchestrator: &mut FilesOrchestrator) -> Option<Batch> {
        let file = orchestrator.get_readable_file(&self.claimed)?;
        self.read_batch(orchestrator, file)
    }

    /// Read and claim up to `limit` batches, oldest first
    pub fn read_batches(&mut self, orchestrator: &mut FilesOrchestrator, limit: usize) -> Vec<Batch> {
        self.read_files(orchestrator, limit)
            .into_iter()
            .filter_map(|file| self.read_batch(orchestrator, file))
            .collect()
    }

    /// Decode `file` and claim it.
    ///
    /// Decoding stops at the first malformed block; events before it are
    /// kept. Returns `None` only when the file cannot be opened.
    pub fn read_batch(&mut self, orchestrator: &FilesOrchestrator, file: File) -> Option<Batch> {
        let stream = match file.stream() {
            Ok(stream) => stream,
            Err(e) => {
                self.telemetry.error("Failed to read data from file", Some(&e));
                return None;
            }
        };

        let max_object_size = orchestrator.preset().readable.max_object_size;
        let blocks = DataBlockReader::new(stream).with_max_block_length(max_object_size);

        let mut events = Vec::new();
        let mut pending_metadata: Option<Bytes> = None;
        for block in blocks {
            let block = match block {
                Ok(block) => block,
                Err(e) => {
                    self.telemetry.error("Failed to read data from file", Some(&e));
                    break;
                }
            };

            let Some(data) = self.decrypt(block.data) else {
                pending_metadata = None;
                continue;
            };
            match block.block_type {
                BlockType::EventMetadata => pending_metadata = Some(data),
                BlockType::Event => events.push(Event {
                    data,
                    metadata: pending_metadata.take(),
                }),
            }
        }

        debug!(file = file.name(), events = events.len(), "Read batch");
        self.claimed.insert(file.name().to_string());
        Some(Batch { events, file })
    }

    /// Delete the batch's file and release its claim
    pub fn mark_batch_as_read(&mut self, orchestrator: &mut FilesOrchestrator, batch: &Batch, reason: RemovalReason) {
        orchestrator.delete(&batch.file, reason);
        self.claimed.remove(batch.file.name());
    }

    /// Release the claim on a batch whose upload will be retried
    pub fn release_batch(&mut self, batch: &Batch) {
        self.claimed.remove(batch.file.name());
    }

    /// Forget every claim, used after the directory was wiped
    pub fn release_all(&mut self) {
        self.claimed.clear();
    }

    fn decrypt(&self, data: Bytes) -> Option<Bytes> {
        let Some(encryption) = &self.encryption else {
            return Some(data);
        };
        match encryption.decrypt(&data) {
            Ok(decrypted) => Some(Bytes::from(decrypted)),
            Err(e) => {
                self.telemetry.error("Failed to decrypt data", Some(&e));
                None
            }
        }
    }
}
