//! File selection for one storage directory
//!
//! The orchestrator decides which file receives the next write and which
//! file is next in line for upload. Files are named after their creation
//! time, so the directory listing doubles as a queue.
//!
//! ## Write side
//!
//! The last file handed out for writing is reused while it is young
//! enough, small enough and has not taken too many writes. Otherwise a new
//! file is created, after purging the oldest files if the directory grew
//! past its size limit.
//!
//! ## Read side
//!
//! Files older than `max_file_age_for_read` are deleted on sight. Of the
//! rest, the oldest one is returned once it reached `min_file_age_for_read`.
//! The file currently receiving writes is never returned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{debug, warn};

use spool_core::{DateProvider, MetricAttributes, Telemetry};

use crate::directory::Directory;
use crate::error::StorageError;
use crate::file::File;
use crate::preset::StoragePreset;

/// Name of the metric reported when a batch file is deleted
pub const BATCH_DELETED_METRIC: &str = "Batch Deleted";
/// Name of the metric reported when a batch file stops receiving writes
pub const BATCH_CLOSED_METRIC: &str = "Batch Closed";

/// Width of file names; keeps lexical and chronological order identical
const FILE_NAME_WIDTH: usize = 20;

/// Why a batch file was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// The intake answered with this status code and the batch is done
    IntakeCode(u16),
    /// The file outlived `max_file_age_for_read`
    Obsolete,
    /// The directory grew past its size limit
    Purged,
    /// No request could be built from the batch
    Invalid,
    /// The batch was uploaded during a flush
    Flushed,
}

impl RemovalReason {
    /// Flushes happen at tear-down and are not reported
    fn include_in_metric(&self) -> bool {
        !matches!(self, RemovalReason::Flushed)
    }
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::IntakeCode(code) => write!(f, "intake-code-{code}"),
            RemovalReason::Obsolete => write!(f, "obsolete"),
            RemovalReason::Purged => write!(f, "purged"),
            RemovalReason::Invalid => write!(f, "invalid"),
            RemovalReason::Flushed => write!(f, "flushed"),
        }
    }
}

/// Extra information reported with batch metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsData {
    /// Name of the feature track, e.g. `logs`
    pub track_name: String,
    /// Lower bound of the upload delay
    pub min_upload_delay: Duration,
    /// Upper bound of the upload delay
    pub max_upload_delay: Duration,
}

/// Orchestrates files in a single directory
pub struct FilesOrchestrator {
    directory: Directory,
    preset: StoragePreset,
    date_provider: Arc<dyn DateProvider>,
    telemetry: Arc<dyn Telemetry>,
    /// `None` when this orchestrator does not report metrics
    metrics: Option<MetricsData>,
    /// Name of the last file returned for writing
    last_writable_file: Option<String>,
    /// Writes handed to the last file so far
    last_writable_file_objects_count: u64,
    /// Sum of write sizes handed to the last file so far
    last_writable_file_approximate_size: u64,
    ignore_files_age_when_reading: bool,
}

impl FilesOrchestrator {
    pub fn new(
        directory: Directory,
        preset: StoragePreset,
        date_provider: Arc<dyn DateProvider>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            directory,
            preset,
            date_provider,
            telemetry,
            metrics: None,
            last_writable_file: None,
            last_writable_file_objects_count: 0,
            last_writable_file_approximate_size: 0,
            ignore_files_age_when_reading: false,
        }
    }

    /// Report batch metrics with the given track information
    pub fn with_metrics(mut self, metrics: MetricsData) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn preset(&self) -> &StoragePreset {
        &self.preset
    }

    /// Read files as soon as they exist, regardless of their age
    pub fn set_ignore_files_age_when_reading(&mut self, ignore: bool) {
        self.ignore_files_age_when_reading = ignore;
    }

    // ========================================================================
    // Write side
    // ========================================================================

    /// File that should receive a write of `write_size` bytes
    pub fn get_writable_file(&mut self, write_size: u64) -> Result<File, StorageError> {
        self.validate(write_size)?;

        if let Some(file) = self.reusable_last_file(write_size) {
            self.last_writable_file_objects_count += 1;
            self.last_writable_file_approximate_size += write_size;
            return Ok(file);
        }

        self.close_last_file(false);
        self.create_new_writable_file(write_size)
    }

    /// Always start a new file for a write of `write_size` bytes
    pub fn get_new_writable_file(&mut self, write_size: u64) -> Result<File, StorageError> {
        self.validate(write_size)?;
        self.close_last_file(true);
        self.create_new_writable_file(write_size)
    }

    /// Stop writing to the current file so it becomes readable
    pub fn close_writable_file(&mut self) {
        self.close_last_file(true);
    }

    fn validate(&self, write_size: u64) -> Result<(), StorageError> {
        let max_object_size = self.preset.readable.max_object_size;
        if write_size > max_object_size {
            return Err(StorageError::ObjectTooLarge {
                size: write_size,
                limit: max_object_size,
            });
        }
        let max_file_size = self.preset.writable.max_file_size;
        if write_size > max_file_size {
            return Err(StorageError::FileTooSmall {
                size: write_size,
                limit: max_file_size,
            });
        }
        Ok(())
    }

    fn reusable_last_file(&self, write_size: u64) -> Option<File> {
        let name = self.last_writable_file.as_deref()?;
        if !self.directory.has_file(name) {
            // Expected when the file was uploaded or purged
            return None;
        }

        let file = File::new(self.directory.path().join(name));
        let size = match file.size() {
            Ok(size) => size,
            Err(e) => {
                self.telemetry
                    .error("Failed to reuse last writable file", Some(&e));
                return None;
            }
        };

        let conditions = &self.preset.writable;
        let recent_enough = self.age_of(name) <= conditions.max_file_age_for_write;
        let has_room = size.saturating_add(write_size) <= conditions.max_file_size;
        let can_take_more = self.last_writable_file_objects_count < conditions.max_objects_in_file;

        (recent_enough && has_room && can_take_more).then_some(file)
    }

    fn create_new_writable_file(&mut self, write_size: u64) -> Result<File, StorageError> {
        // Purging lists the whole directory, so it only runs on rotation
        self.purge_directory_if_needed()?;

        let mut name = file_name_from(self.date_provider.now());
        while self.directory.has_file(&name) {
            name = next_file_name(&name);
        }
        let file = self.directory.create_file(&name)?;
        debug!(file = %name, "Created new writable file");

        self.last_writable_file = Some(name);
        self.last_writable_file_objects_count = 1;
        self.last_writable_file_approximate_size = write_size;
        Ok(file)
    }

    fn close_last_file(&mut self, forced_new: bool) {
        let Some(name) = self.last_writable_file.take() else {
            return;
        };
        if let Some(metrics) = &self.metrics {
            let attributes = attributes(json!({
                "metric_type": "batch closed",
                "track": metrics.track_name,
                "uploader_window": millis(self.preset.uploader_window()),
                "batch_size": self.last_writable_file_approximate_size,
                "batch_events_count": self.last_writable_file_objects_count,
                "batch_duration": millis(self.age_of(&name)),
                "forced_new": forced_new,
            }));
            self.telemetry.metric(BATCH_CLOSED_METRIC, attributes);
        }
        self.last_writable_file_objects_count = 0;
        self.last_writable_file_approximate_size = 0;
    }

    fn purge_directory_if_needed(&mut self) -> Result<(), StorageError> {
        let mut files_with_size = Vec::new();
        for file in self.directory.files()? {
            // Files may vanish between listing and stat
            if let Ok(size) = file.size() {
                files_with_size.push((file, size));
            }
        }
        let total: u64 = files_with_size.iter().map(|(_, size)| size).sum();
        let limit = self.preset.max_directory_size;
        if total <= limit {
            return Ok(());
        }

        let size_to_free = total - limit;
        let mut freed = 0;
        warn!(total, limit, "Storage directory over size limit, purging oldest files");
        for (file, size) in files_with_size {
            if freed >= size_to_free {
                break;
            }
            if file.delete()? {
                self.report_deleted(&file, RemovalReason::Purged);
            }
            freed += size;
        }
        Ok(())
    }

    // ========================================================================
    // Read side
    // ========================================================================

    /// Oldest file ready for upload that is not in `excluding`
    pub fn get_readable_file(&mut self, excluding: &HashSet<String>) -> Option<File> {
        let files = match self.directory.files() {
            Ok(files) => files,
            Err(e) => {
                self.telemetry.error("Failed to obtain readable file", Some(&e));
                return None;
            }
        };

        let max_age = self.preset.readable.max_file_age_for_read;
        let mut candidates = Vec::with_capacity(files.len());
        for file in files {
            if self.age_of(file.name()) > max_age {
                match file.delete() {
                    Ok(true) => self.report_deleted(&file, RemovalReason::Obsolete),
                    Ok(false) => {}
                    Err(e) => self.telemetry.error("Failed to delete obsolete file", Some(&e)),
                }
                continue;
            }
            candidates.push((file_creation_date_from(file.name()), file));
        }
        candidates.sort_by(|(a, _), (b, _)| a.cmp(b));

        let (_, oldest) = candidates.into_iter().find(|(_, file)| {
            !excluding.contains(file.name()) && !self.is_active_writable_file(file.name())
        })?;

        if self.ignore_files_age_when_reading
            || self.age_of(oldest.name()) >= self.preset.readable.min_file_age_for_read
        {
            if self.last_writable_file.as_deref() == Some(oldest.name()) {
                // Too old to be reused anyway; make sure no write lands there again
                self.close_last_file(false);
            }
            Some(oldest)
        } else {
            None
        }
    }

    /// Up to `limit` readable files, oldest first
    pub fn get_readable_files(&mut self, excluding: &HashSet<String>, limit: usize) -> Vec<File> {
        let mut excluded = excluding.clone();
        let mut files = Vec::new();
        while files.len() < limit {
            let Some(file) = self.get_readable_file(&excluded) else {
                break;
            };
            excluded.insert(file.name().to_string());
            files.push(file);
        }
        files
    }

    /// Delete a file that was consumed. A file removed in the meantime,
    /// e.g. by a purge, is not reported twice.
    pub fn delete(&mut self, file: &File, reason: RemovalReason) {
        match file.delete() {
            Ok(true) => self.report_deleted(file, reason),
            Ok(false) => debug!(file = file.name(), %reason, "File already deleted"),
            Err(e) => self.telemetry.error("Failed to delete file", Some(&e)),
        }
    }

    fn is_active_writable_file(&self, name: &str) -> bool {
        self.last_writable_file.as_deref() == Some(name)
            && self.age_of(name) <= self.preset.writable.max_file_age_for_write
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn age_of(&self, file_name: &str) -> Duration {
        (self.date_provider.now() - file_creation_date_from(file_name))
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn report_deleted(&self, file: &File, reason: RemovalReason) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        if !reason.include_in_metric() {
            return;
        }
        let attributes = attributes(json!({
            "metric_type": "batch deleted",
            "track": metrics.track_name,
            "uploader_delay": {
                "min": millis(metrics.min_upload_delay),
                "max": millis(metrics.max_upload_delay),
            },
            "uploader_window": millis(self.preset.uploader_window()),
            "batch_age": millis(self.age_of(file.name())),
            "batch_removal_reason": reason.to_string(),
        }));
        self.telemetry.metric(BATCH_DELETED_METRIC, attributes);
    }
}

/// File name for a file created at `date`
pub fn file_name_from(date: DateTime<Utc>) -> String {
    let millis = u64::try_from(date.timestamp_millis()).unwrap_or(0);
    format!("{millis:0width$}", width = FILE_NAME_WIDTH)
}

/// Creation date encoded in a file name. Foreign names map to the epoch,
/// which makes them obsolete.
pub fn file_creation_date_from(name: &str) -> DateTime<Utc> {
    name.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn next_file_name(name: &str) -> String {
    let millis = name.parse::<u64>().unwrap_or(0).saturating_add(1);
    format!("{millis:0width$}", width = FILE_NAME_WIDTH)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn attributes(value: Value) -> MetricAttributes {
    match value {
        Value::Object(map) => map,
        _ => MetricAttributes::new(),
    }
}

#[cfg(test)]
mod tests {
    use spool_core::{ManualDateProvider, RecordingTelemetry};
    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        _root: TempDir,
        clock: Arc<ManualDateProvider>,
        telemetry: Arc<RecordingTelemetry>,
        orchestrator: FilesOrchestrator,
    }

    fn start_date() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn preset() -> StoragePreset {
        StoragePreset::default()
            .with_max_file_size(1_000)
            .with_max_directory_size(10_000)
            .with_max_objects_in_file(3)
            .with_max_object_size(500)
            .with_max_file_age_for_write(Duration::from_secs(10))
            .with_min_file_age_for_read(Duration::from_secs(15))
            .with_max_file_age_for_read(Duration::from_secs(60))
    }

    fn fixture(preset: StoragePreset) -> Fixture {
        let root = TempDir::new().unwrap();
        let clock = Arc::new(ManualDateProvider::new(start_date()));
        let telemetry = Arc::new(RecordingTelemetry::new());
        let orchestrator = FilesOrchestrator::new(
            Directory::open(root.path()).unwrap(),
            preset,
            clock.clone(),
            telemetry.clone(),
        )
        .with_metrics(MetricsData {
            track_name: "logs".to_string(),
            min_upload_delay: Duration::from_secs(1),
            max_upload_delay: Duration::from_secs(20),
        });
        Fixture {
            _root: root,
            clock,
            telemetry,
            orchestrator,
        }
    }

    fn write(fixture: &mut Fixture, bytes: usize) -> File {
        let file = fixture.orchestrator.get_writable_file(bytes as u64).unwrap();
        file.append(&vec![b'x'; bytes]).unwrap();
        file
    }

    #[test]
    fn test_file_names_sort_chronologically() {
        let early = file_name_from(DateTime::from_timestamp_millis(999).unwrap());
        let late = file_name_from(DateTime::from_timestamp_millis(1_000).unwrap());
        assert_eq!(early.len(), FILE_NAME_WIDTH);
        assert!(early < late);
        assert_eq!(file_creation_date_from(&late).timestamp_millis(), 1_000);
        assert_eq!(file_creation_date_from("not-a-date"), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_reuses_file_within_limits() {
        let mut f = fixture(preset());
        let first = write(&mut f, 10);
        f.clock.advance(Duration::from_secs(1));
        let second = write(&mut f, 10);
        let third = write(&mut f, 10);

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(f.orchestrator.directory().files_count().unwrap(), 1);
    }

    #[test]
    fn test_rotates_after_max_objects() {
        let mut f = fixture(preset());
        for _ in 0..4 {
            write(&mut f, 10);
        }
        assert_eq!(f.orchestrator.directory().files_count().unwrap(), 2);

        let closed = f.telemetry.metrics(BATCH_CLOSED_METRIC);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0]["batch_events_count"], 3);
        assert_eq!(closed[0]["forced_new"], false);
    }

    #[test]
    fn test_rotates_after_max_age() {
        let mut f = fixture(preset());
        let first = write(&mut f, 10);
        f.clock.advance(Duration::from_secs(10));
        assert_eq!(write(&mut f, 10), first);
        f.clock.advance(Duration::from_millis(1));
        assert_ne!(write(&mut f, 10), first);
    }

    #[test]
    fn test_rotates_when_file_is_full() {
        let mut f = fixture(preset());
        let first = write(&mut f, 500);
        assert_eq!(write(&mut f, 500), first);
        assert_ne!(write(&mut f, 1), first);
    }

    #[test]
    fn test_rotates_when_last_file_was_deleted() {
        let mut f = fixture(preset());
        let first = write(&mut f, 10);
        first.delete().unwrap();
        f.clock.advance(Duration::from_millis(5));
        let second = write(&mut f, 10);
        assert_ne!(first, second);
    }

    #[test]
    fn test_forced_new_file() {
        let mut f = fixture(preset());
        let first = write(&mut f, 10);
        let second = f.orchestrator.get_new_writable_file(10).unwrap();
        assert_ne!(first, second);
        assert_eq!(f.telemetry.metrics(BATCH_CLOSED_METRIC)[0]["forced_new"], true);
    }

    #[test]
    fn test_same_millisecond_does_not_collide() {
        let mut f = fixture(preset());
        let first = f.orchestrator.get_new_writable_file(1).unwrap();
        let second = f.orchestrator.get_new_writable_file(1).unwrap();
        assert_ne!(first.name(), second.name());
        assert!(first.name() < second.name());
    }

    #[test]
    fn test_rejects_oversized_writes() {
        let mut f = fixture(preset());
        assert!(matches!(
            f.orchestrator.get_writable_file(501),
            Err(StorageError::ObjectTooLarge { size: 501, limit: 500 })
        ));

        let mut f = fixture(preset().with_max_file_size(100));
        assert!(matches!(
            f.orchestrator.get_writable_file(101),
            Err(StorageError::FileTooSmall { size: 101, limit: 100 })
        ));
        assert_eq!(f.orchestrator.directory().files_count().unwrap(), 0);
    }

    #[test]
    fn test_readable_file_waits_for_min_age() {
        let mut f = fixture(preset());
        let file = write(&mut f, 10);
        f.orchestrator.close_writable_file();

        f.clock.advance(Duration::from_secs(14));
        assert!(f.orchestrator.get_readable_file(&HashSet::new()).is_none());

        f.clock.advance(Duration::from_secs(1));
        assert_eq!(f.orchestrator.get_readable_file(&HashSet::new()), Some(file));
    }

    #[test]
    fn test_readable_files_oldest_first_with_exclusions() {
        let mut f = fixture(preset());
        let first = f.orchestrator.get_new_writable_file(1).unwrap();
        f.clock.advance(Duration::from_secs(1));
        let second = f.orchestrator.get_new_writable_file(1).unwrap();
        f.clock.advance(Duration::from_secs(1));
        let third = f.orchestrator.get_new_writable_file(1).unwrap();
        f.orchestrator.close_writable_file();
        f.clock.advance(Duration::from_secs(20));

        let excluded = HashSet::from([first.name().to_string()]);
        assert_eq!(f.orchestrator.get_readable_file(&excluded), Some(second.clone()));

        let files = f.orchestrator.get_readable_files(&HashSet::new(), 10);
        assert_eq!(files, vec![first, second, third]);
    }

    #[test]
    fn test_active_writable_file_is_never_readable() {
        let mut f = fixture(preset().with_min_file_age_for_read(Duration::ZERO));
        let file = write(&mut f, 10);

        assert!(f.orchestrator.get_readable_file(&HashSet::new()).is_none());
        f.orchestrator.set_ignore_files_age_when_reading(true);
        assert!(f.orchestrator.get_readable_file(&HashSet::new()).is_none());

        // Once too old for writing, the file is handed to the reader and
        // the next write starts a new file
        f.clock.advance(Duration::from_secs(11));
        assert_eq!(f.orchestrator.get_readable_file(&HashSet::new()), Some(file.clone()));
        assert_ne!(write(&mut f, 10), file);
    }

    #[test]
    fn test_obsolete_files_are_deleted() {
        let mut f = fixture(preset());
        let file = write(&mut f, 10);
        f.orchestrator.close_writable_file();
        f.clock.advance(Duration::from_secs(61));

        assert!(f.orchestrator.get_readable_file(&HashSet::new()).is_none());
        assert!(!file.exists());

        let deleted = f.telemetry.metrics(BATCH_DELETED_METRIC);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0]["batch_removal_reason"], "obsolete");
        assert_eq!(deleted[0]["track"], "logs");
        assert_eq!(deleted[0]["uploader_delay"]["max"], 20_000);
    }

    #[test]
    fn test_purges_oldest_files_over_directory_limit() {
        let mut f = fixture(preset().with_max_directory_size(1_000));
        let mut files = Vec::new();
        for _ in 0..3 {
            let file = f.orchestrator.get_new_writable_file(400).unwrap();
            file.append(&[0u8; 400]).unwrap();
            files.push(file);
            f.clock.advance(Duration::from_millis(1));
        }
        // 1200 bytes on disk, the next rotation frees the oldest file
        f.orchestrator.get_new_writable_file(1).unwrap();

        assert!(!files[0].exists());
        assert!(files[1].exists());
        assert!(files[2].exists());
        let deleted = f.telemetry.metrics(BATCH_DELETED_METRIC);
        assert_eq!(deleted[0]["batch_removal_reason"], "purged");
    }

    #[test]
    fn test_purged_file_is_not_reported_again_when_consumed() {
        let mut f = fixture(preset().with_max_directory_size(20));
        let claimed = f.orchestrator.get_new_writable_file(21).unwrap();
        claimed.append(&[0u8; 21]).unwrap();
        f.clock.advance(Duration::from_millis(1));

        // Rotation purges the claimed file while its upload is in flight
        let next = f.orchestrator.get_new_writable_file(1).unwrap();
        next.append(&[0u8; 1]).unwrap();
        assert!(!claimed.exists());

        f.orchestrator.delete(&claimed, RemovalReason::IntakeCode(202));

        let reasons: Vec<_> = f
            .telemetry
            .metrics(BATCH_DELETED_METRIC)
            .iter()
            .map(|metric| metric["batch_removal_reason"].clone())
            .collect();
        assert_eq!(reasons, vec![json!("purged")]);
    }

    #[test]
    fn test_delete_reports_reason() {
        let mut f = fixture(preset());
        let file = write(&mut f, 10);
        f.orchestrator.delete(&file, RemovalReason::IntakeCode(202));
        f.orchestrator.delete(&file, RemovalReason::Flushed);

        assert!(!file.exists());
        let deleted = f.telemetry.metrics(BATCH_DELETED_METRIC);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0]["batch_removal_reason"], "intake-code-202");
    }
}
