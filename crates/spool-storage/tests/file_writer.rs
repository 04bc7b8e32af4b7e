//! Tests for writing events into orchestrated files

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::DateTime;
use spool_core::{
    DataEncryption, EncryptionError, Event, ManualDateProvider, RecordingTelemetry, SystemDateProvider,
    TrackingConsent,
};
use spool_storage::{
    DataBlock, DataBlockReader, Directory, FeatureStorage, FeatureStorageConfig, FileWriter, FilesOrchestrator,
    StoragePreset,
};
use tempfile::TempDir;

/// Reverses bytes and appends a marker so encrypted data is recognizable
struct ReversingEncryption;

impl DataEncryption for ReversingEncryption {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let mut out: Vec<u8> = data.iter().rev().copied().collect();
        out.push(b'!');
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        match data.split_last() {
            Some((b'!', rest)) => Ok(rest.iter().rev().copied().collect()),
            _ => Err(EncryptionError::Decrypt("missing marker".to_string())),
        }
    }
}

fn single_file_preset() -> StoragePreset {
    StoragePreset::default()
        .with_max_file_size(u64::MAX)
        .with_max_directory_size(u64::MAX)
        .with_max_objects_in_file(u64::MAX)
        .with_max_object_size(u64::MAX)
        .with_max_file_age_for_write(Duration::from_secs(3600))
}

fn orchestrator(root: &TempDir, preset: StoragePreset, telemetry: Arc<RecordingTelemetry>) -> FilesOrchestrator {
    spool_logging::init_testing();
    FilesOrchestrator::new(
        Directory::open(root.path()).unwrap(),
        preset,
        Arc::new(ManualDateProvider::new(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap())),
        telemetry,
    )
}

fn framed(blocks: &[DataBlock]) -> Vec<u8> {
    blocks.iter().flat_map(|block| block.serialize().unwrap()).collect()
}

fn only_file_content(root: &TempDir) -> Vec<u8> {
    let files = Directory::open(root.path()).unwrap().files().unwrap();
    assert_eq!(files.len(), 1);
    fs::read(files[0].path()).unwrap()
}

#[test]
fn test_writes_tlv_blocks_to_single_file() {
    let root = TempDir::new().unwrap();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut orchestrator = orchestrator(&root, single_file_preset(), telemetry.clone());
    let writer = FileWriter::new(telemetry.clone());

    writer.write(&mut orchestrator, &Event::new(br#"{"key1":"value1"}"#.to_vec()));
    writer.write(
        &mut orchestrator,
        &Event::new(br#"{"key2":"value2"}"#.to_vec()).with_metadata(br#"{"meta":"2"}"#.to_vec()),
    );
    writer.write(&mut orchestrator, &Event::new(br#"{"key3":"value3"}"#.to_vec()));

    let expected = framed(&[
        DataBlock::event(br#"{"key1":"value1"}"#.to_vec()),
        DataBlock::metadata(br#"{"meta":"2"}"#.to_vec()),
        DataBlock::event(br#"{"key2":"value2"}"#.to_vec()),
        DataBlock::event(br#"{"key3":"value3"}"#.to_vec()),
    ]);
    assert_eq!(only_file_content(&root), expected);
    assert!(telemetry.error_messages().is_empty());
}

#[test]
fn test_writes_encrypted_blocks() {
    let root = TempDir::new().unwrap();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut orchestrator = orchestrator(&root, single_file_preset(), telemetry.clone());
    let writer = FileWriter::new(telemetry).with_encryption(Arc::new(ReversingEncryption));

    writer.write(&mut orchestrator, &Event::new(b"abc".to_vec()).with_metadata(b"xy".to_vec()));

    let expected = framed(&[DataBlock::metadata(b"yx!".to_vec()), DataBlock::event(b"cba!".to_vec())]);
    assert_eq!(only_file_content(&root), expected);
}

#[test]
fn test_write_that_can_never_fit_a_file_is_dropped() {
    let root = TempDir::new().unwrap();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut orchestrator = orchestrator(&root, single_file_preset().with_max_file_size(23), telemetry.clone());
    let writer = FileWriter::new(telemetry.clone());

    // 17 bytes of JSON, 23 bytes once framed
    let first = Event::new(br#"{"key1":"value1"}"#.to_vec());
    writer.write(&mut orchestrator, &first);
    writer.write(
        &mut orchestrator,
        &Event::new(br#"{"key2":"value3 that makes it exceed 23 bytes"}"#.to_vec()),
    );

    assert_eq!(only_file_content(&root), framed(&[DataBlock::event(first.data.clone())]));
    assert_eq!(telemetry.error_messages(), vec!["Failed to write data"]);
}

#[test]
fn test_write_over_max_object_size_is_dropped() {
    let root = TempDir::new().unwrap();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut orchestrator = orchestrator(&root, single_file_preset().with_max_object_size(23), telemetry.clone());
    let writer = FileWriter::new(telemetry.clone());

    writer.write(&mut orchestrator, &Event::new(vec![b'a'; 17]));
    writer.write(&mut orchestrator, &Event::new(vec![b'b'; 18]));

    assert_eq!(only_file_content(&root), framed(&[DataBlock::event(vec![b'a'; 17])]));
    assert_eq!(telemetry.error_messages(), vec!["Failed to write data"]);
}

#[test]
fn test_io_failure_drops_only_that_write() {
    let root = TempDir::new().unwrap();
    let data_dir = root.path().join("data");
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut orchestrator = FilesOrchestrator::new(
        Directory::create(&data_dir).unwrap(),
        single_file_preset(),
        Arc::new(SystemDateProvider),
        telemetry.clone(),
    );
    let writer = FileWriter::new(telemetry.clone());

    writer.write(&mut orchestrator, &Event::new(b"first".to_vec()));
    fs::remove_dir_all(&data_dir).unwrap();
    writer.write(&mut orchestrator, &Event::new(b"second".to_vec()));
    assert_eq!(telemetry.error_messages(), vec!["Failed to write data"]);

    fs::create_dir_all(&data_dir).unwrap();
    writer.write(&mut orchestrator, &Event::new(b"third".to_vec()));
    let files = Directory::open(&data_dir).unwrap().files().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(fs::read(files[0].path()).unwrap(), framed(&[DataBlock::event(b"third".to_vec())]));
}

#[test]
fn test_forced_new_file_per_event() {
    let root = TempDir::new().unwrap();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut orchestrator = orchestrator(&root, single_file_preset(), telemetry.clone());
    let writer = FileWriter::new(telemetry).with_forced_new_file(true);

    for i in 0..3u8 {
        writer.write(&mut orchestrator, &Event::new(vec![i]));
    }

    let files = Directory::open(root.path()).unwrap().files().unwrap();
    let names: HashSet<_> = files.iter().map(|file| file.name().to_string()).collect();
    assert_eq!(names.len(), 3);
}

/// Permissions flip and the data directory vanishes while the queue
/// writes; whatever lands must decode. Removing the directory fails writes
/// even for a user that ignores permissions.
#[test]
fn test_random_io_interruptions_never_corrupt_the_file() {
    let root = TempDir::new().unwrap();
    let directory = Directory::open(root.path()).unwrap();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let storage = FeatureStorage::open(
        &directory,
        FeatureStorageConfig::new("logs").with_preset(single_file_preset()),
        Arc::new(SystemDateProvider),
        telemetry,
    )
    .unwrap();
    let writer = storage.writer(TrackingConsent::Granted);
    let data_directory = directory.subdirectory("logs/v2").unwrap();
    let payload = br#"{"foo":"bar"}"#;

    let interrupter_directory = data_directory.clone();
    let interrupter = thread::spawn(move || {
        for i in 0..300 {
            if rand::random::<u8>() % 16 == 0 {
                let _ = fs::remove_dir_all(interrupter_directory.path());
                thread::sleep(Duration::from_micros(20));
                fs::create_dir_all(interrupter_directory.path()).unwrap();
            } else if let Some(file) = interrupter_directory.files().ok().and_then(|files| files.into_iter().next()) {
                let _ = file.set_readonly(rand::random::<bool>());
            }
            if i % 10 == 0 {
                thread::sleep(Duration::from_micros(50));
            }
        }
    });

    for _ in 0..300 {
        writer.write(Event::new(payload.to_vec()));
    }
    interrupter.join().unwrap();
    storage.flush().unwrap();

    for file in data_directory.files().unwrap() {
        file.set_readonly(false).unwrap();
    }
    writer.write(Event::new(payload.to_vec()));
    storage.flush().unwrap();

    let blocks: Vec<_> = data_directory
        .files()
        .unwrap()
        .into_iter()
        .flat_map(|file| DataBlockReader::new(file.stream().unwrap()).all().unwrap())
        .collect();
    assert!(!blocks.is_empty());
    assert!(blocks.len() <= 301);
    for block in blocks {
        assert_eq!(&block.data[..], payload);
    }
}
