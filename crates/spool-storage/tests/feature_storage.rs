//! Tests for consent-aware feature storage

use std::sync::{Arc, mpsc};
use std::time::Duration;

use spool_core::{Event, RecordingTelemetry, SdkContext, SystemDateProvider, TrackingConsent};
use spool_storage::{
    AUTHORIZED_DIRECTORY, DataBlockReader, Directory, FeatureStorage, FeatureStorageConfig, RemovalReason,
    StoragePreset, UNAUTHORIZED_DIRECTORY,
};
use tempfile::TempDir;
use tokio::sync::watch;

fn immediate_preset() -> StoragePreset {
    StoragePreset::default()
        .with_max_file_age_for_write(Duration::from_secs(3600))
        .with_min_file_age_for_read(Duration::ZERO)
}

fn open(root: &TempDir, preset: StoragePreset) -> FeatureStorage {
    spool_logging::init_testing();
    FeatureStorage::open(
        &Directory::open(root.path()).unwrap(),
        FeatureStorageConfig::new("logs").with_preset(preset),
        Arc::new(SystemDateProvider),
        Arc::new(RecordingTelemetry::new()),
    )
    .unwrap()
}

fn directory(root: &TempDir, name: &str) -> Directory {
    Directory::open(root.path().join("logs").join(name)).unwrap()
}

fn stored_events(directory: &Directory) -> Vec<Vec<u8>> {
    directory
        .files()
        .unwrap()
        .into_iter()
        .flat_map(|file| DataBlockReader::new(file.stream().unwrap()).all().unwrap())
        .map(|block| block.data.to_vec())
        .collect()
}

#[test]
fn test_writes_are_routed_by_consent() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset());

    storage.writer(TrackingConsent::Granted).write(Event::new(b"granted".to_vec()));
    storage.writer(TrackingConsent::Pending).write(Event::new(b"pending".to_vec()));
    storage.writer(TrackingConsent::NotGranted).write(Event::new(b"dropped".to_vec()));
    storage.flush().unwrap();

    assert_eq!(stored_events(&directory(&root, AUTHORIZED_DIRECTORY)), vec![b"granted".to_vec()]);
    assert_eq!(stored_events(&directory(&root, UNAUTHORIZED_DIRECTORY)), vec![b"pending".to_vec()]);
}

#[test]
fn test_granting_consent_moves_pending_data() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset());
    let pending = storage.writer(TrackingConsent::Pending);

    pending.write(Event::new(b"one".to_vec()));
    pending.write(Event::new(b"two".to_vec()));
    storage.migrate_unauthorized_data(TrackingConsent::Granted);
    storage.flush().unwrap();

    assert!(stored_events(&directory(&root, UNAUTHORIZED_DIRECTORY)).is_empty());
    assert_eq!(
        stored_events(&directory(&root, AUTHORIZED_DIRECTORY)),
        vec![b"one".to_vec(), b"two".to_vec()]
    );
}

#[test]
fn test_denying_consent_deletes_pending_data() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset());

    storage.writer(TrackingConsent::Granted).write(Event::new(b"kept".to_vec()));
    storage.writer(TrackingConsent::Pending).write(Event::new(b"gone".to_vec()));
    storage.migrate_unauthorized_data(TrackingConsent::NotGranted);
    storage.flush().unwrap();

    assert!(stored_events(&directory(&root, UNAUTHORIZED_DIRECTORY)).is_empty());
    assert_eq!(stored_events(&directory(&root, AUTHORIZED_DIRECTORY)), vec![b"kept".to_vec()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_write_queued_before_consent_change_follows_the_new_consent() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset());
    let (context, receiver) = watch::channel(SdkContext {
        tracking_consent: TrackingConsent::Pending,
        ..SdkContext::new("token")
    });
    let writer = storage.context_writer(receiver);

    // Hold the queue so the write below is still waiting when consent changes
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let busy = {
        let storage = storage.clone();
        tokio::spawn(async move {
            storage
                .run(move |_| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                })
                .await
        })
    };
    started_rx.recv().unwrap();

    writer.write(Event::new(b"racing".to_vec()));
    context.send_modify(|context| context.tracking_consent = TrackingConsent::Granted);
    storage.migrate_unauthorized_data(TrackingConsent::Granted);

    release_tx.send(()).unwrap();
    busy.await.unwrap().unwrap();
    storage.flush_async().await.unwrap();

    assert!(stored_events(&directory(&root, UNAUTHORIZED_DIRECTORY)).is_empty());
    assert_eq!(stored_events(&directory(&root, AUTHORIZED_DIRECTORY)), vec![b"racing".to_vec()]);
}

#[test]
fn test_context_writer_drops_events_once_consent_is_denied() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset());
    let (context, receiver) = watch::channel(SdkContext::new("token"));
    let writer = storage.context_writer(receiver);

    context.send_modify(|context| context.tracking_consent = TrackingConsent::NotGranted);
    writer.write(Event::new(b"dropped".to_vec()));
    storage.flush().unwrap();

    assert!(stored_events(&directory(&root, AUTHORIZED_DIRECTORY)).is_empty());
    assert!(stored_events(&directory(&root, UNAUTHORIZED_DIRECTORY)).is_empty());
}

#[test]
fn test_pending_data_from_previous_run_is_cleared() {
    let root = TempDir::new().unwrap();
    {
        let storage = open(&root, immediate_preset());
        storage.writer(TrackingConsent::Pending).write(Event::new(b"stale".to_vec()));
        storage.writer(TrackingConsent::Granted).write(Event::new(b"kept".to_vec()));
        storage.flush().unwrap();
    }

    let storage = open(&root, immediate_preset());
    storage.flush().unwrap();

    assert!(stored_events(&directory(&root, UNAUTHORIZED_DIRECTORY)).is_empty());
    assert_eq!(stored_events(&directory(&root, AUTHORIZED_DIRECTORY)), vec![b"kept".to_vec()]);
}

#[test]
fn test_clear_all_data() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset());
    storage.writer(TrackingConsent::Granted).write(Event::new(b"a".to_vec()));
    storage.writer(TrackingConsent::Pending).write(Event::new(b"b".to_vec()));

    storage.clear_all_data();
    storage.writer(TrackingConsent::Granted).write(Event::new(b"after".to_vec()));
    storage.flush().unwrap();

    assert!(stored_events(&directory(&root, UNAUTHORIZED_DIRECTORY)).is_empty());
    assert_eq!(stored_events(&directory(&root, AUTHORIZED_DIRECTORY)), vec![b"after".to_vec()]);
}

#[test]
fn test_one_write_over_object_limit_starts_second_file() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset().with_max_objects_in_file(5));
    let writer = storage.writer(TrackingConsent::Granted);

    for i in 0..6u8 {
        writer.write(Event::new(vec![i]));
    }
    storage.flush().unwrap();

    assert_eq!(directory(&root, AUTHORIZED_DIRECTORY).files_count().unwrap(), 2);
}

#[tokio::test]
async fn test_lowered_object_limit_still_uploads_every_stored_event() {
    let root = TempDir::new().unwrap();
    {
        let storage = open(&root, immediate_preset().with_max_objects_in_file(5));
        let writer = storage.writer(TrackingConsent::Granted);
        for i in 0..5u8 {
            writer.write(Event::new(vec![i]));
        }
        storage.flush().unwrap();
    }

    let storage = open(&root, immediate_preset().with_max_objects_in_file(3));
    let batches = storage.read_batches(10).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].events.len(), 5);

    for batch in batches {
        storage.mark_batch_as_read(batch, RemovalReason::IntakeCode(202));
    }
    storage.flush_async().await.unwrap();
    assert_eq!(directory(&root, AUTHORIZED_DIRECTORY).files_count().unwrap(), 0);
}

#[tokio::test]
async fn test_regular_reads_skip_the_file_being_written() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset());
    storage.writer(TrackingConsent::Granted).write(Event::new(b"fresh".to_vec()));

    assert!(storage.read_batches(10).await.unwrap().is_empty());

    let batches = storage.read_all_batches().await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].events, vec![Event::new(b"fresh".to_vec())]);

    // Writes after the flush go to a new file
    storage.writer(TrackingConsent::Granted).write(Event::new(b"next".to_vec()));
    storage.flush_async().await.unwrap();
    assert_eq!(directory(&root, AUTHORIZED_DIRECTORY).files_count().unwrap(), 2);
}

#[tokio::test]
async fn test_marking_batch_as_read_deletes_it() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset().with_max_file_age_for_write(Duration::ZERO));
    storage.writer(TrackingConsent::Granted).write(Event::new(b"upload me".to_vec()));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let batches = storage.read_batches(10).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert!(storage.read_batches(10).await.unwrap().is_empty());

    let batch = batches.into_iter().next().unwrap();
    let file = batch.file.clone();
    storage.mark_batch_as_read(batch, RemovalReason::IntakeCode(202));
    storage.flush_async().await.unwrap();

    assert!(!file.exists());
}

#[tokio::test]
async fn test_released_batch_is_read_again() {
    let root = TempDir::new().unwrap();
    let storage = open(&root, immediate_preset().with_max_file_age_for_write(Duration::ZERO));
    storage.writer(TrackingConsent::Granted).write(Event::new(b"retry me".to_vec()));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let batch = storage.read_batches(1).await.unwrap().remove(0);
    storage.release_batch(batch.clone());

    let again = storage.read_batches(1).await.unwrap();
    assert_eq!(again, vec![batch]);
}
