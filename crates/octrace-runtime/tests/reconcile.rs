mod common;

use common::{Pipeline, T0};
use octrace_runtime::EventOutcome;
use octrace_testing::{MessageSpec, PartSpec, TestStorage};
use octrace_types::{FileStatus, FileType};
use std::sync::Barrier;

fn completed_pipeline(storage: &TestStorage) -> Pipeline {
    let pipeline = Pipeline::open(storage);
    pipeline.coordinator.recover().unwrap();
    pipeline.bulk_loader().load_all(T0).unwrap();
    pipeline
}

#[test]
fn test_missed_event_recovered_by_next_scan() {
    let storage = TestStorage::new();
    let pipeline = completed_pipeline(&storage);

    // Written after the cutover; no watcher ever saw it.
    let path = storage
        .add_part(&PartSpec::text("prt_1", "ses_1", "msg_1", "hello"))
        .unwrap();
    storage.set_mtime(&path, T0 + 30.0).unwrap();

    let reconciler = pipeline.reconciler();
    let stale = reconciler.scan_now().unwrap();
    assert_eq!(stale, vec![path.clone()]);

    let stats = pipeline.watcher().ingest_batch(stale).unwrap();
    assert_eq!(stats.get(FileType::Part).records, 1);

    assert!(reconciler.scan_now().unwrap().is_empty());
    let db = pipeline.db();
    assert_eq!(
        db.get_indexed_file(&path.to_string_lossy())
            .unwrap()
            .unwrap()
            .status,
        FileStatus::Processed
    );
    assert_eq!(db.parts_for_message("msg_1").unwrap().len(), 1);
}

#[test]
fn test_partial_write_stays_pending_until_complete() {
    let storage = TestStorage::new();
    let pipeline = completed_pipeline(&storage);
    let watcher = pipeline.watcher();
    let reconciler = pipeline.reconciler();

    let path = storage
        .write_raw("message/ses_1/msg_1.json", br#"{"id":"msg_1","sessionID":"ses_1","#)
        .unwrap();
    storage.set_mtime(&path, T0 + 10.0).unwrap();

    assert_eq!(
        watcher.on_file_event(&path, FileType::Message).unwrap(),
        EventOutcome::NotReady
    );
    {
        let db = pipeline.db();
        let entry = db.get_indexed_file(&path.to_string_lossy()).unwrap().unwrap();
        assert_eq!(entry.status, FileStatus::Pending);
        assert!(db.messages_for_session("ses_1").unwrap().is_empty());
    }

    // Pending entries are offered again even at the same mtime.
    assert_eq!(reconciler.scan_now().unwrap(), vec![path.clone()]);

    storage
        .add_message(&MessageSpec::user("msg_1", "ses_1", 1000))
        .unwrap();
    storage.set_mtime(&path, T0 + 11.0).unwrap();

    let stale = reconciler.scan_now().unwrap();
    watcher.ingest_batch(stale).unwrap();
    assert!(reconciler.scan_now().unwrap().is_empty());
    assert_eq!(pipeline.db().messages_for_session("ses_1").unwrap().len(), 1);
}

#[test]
fn test_repeated_events_ingest_once_per_mtime() {
    let storage = TestStorage::new();
    let pipeline = completed_pipeline(&storage);
    let watcher = pipeline.watcher();

    let path = storage
        .add_message(&MessageSpec::assistant("msg_1", "ses_1", "build", 1000).tokens(10, 5))
        .unwrap();
    storage.set_mtime(&path, T0 + 1.0).unwrap();

    let first = watcher.ingest_batch(vec![path.clone()]).unwrap();
    assert_eq!(first.get(FileType::Message).records, 1);
    assert_eq!(first.get(FileType::Message).skipped, 0);

    let second = watcher.ingest_batch(vec![path.clone()]).unwrap();
    assert_eq!(second.get(FileType::Message).records, 0);
    assert_eq!(second.get(FileType::Message).skipped, 1);

    // A new version is a new ingestion, replacing the row in place.
    storage
        .add_message(&MessageSpec::assistant("msg_1", "ses_1", "build", 1000).tokens(20, 5))
        .unwrap();
    storage.set_mtime(&path, T0 + 2.0).unwrap();
    assert_eq!(
        watcher.on_file_event(&path, FileType::Message).unwrap(),
        EventOutcome::Ingested
    );

    let messages = pipeline.db().messages_for_session("ses_1").unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].tokens_in, 20);
}

#[test]
fn test_concurrent_events_for_one_file_ingest_once() {
    let storage = TestStorage::new();
    let pipeline = completed_pipeline(&storage);

    let path = storage
        .add_message(&MessageSpec::user("msg_1", "ses_1", 1000))
        .unwrap();
    storage.set_mtime(&path, T0 + 1.0).unwrap();

    let start = Barrier::new(6);
    let outcomes: Vec<EventOutcome> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let watcher = pipeline.watcher();
                let (path, start) = (&path, &start);
                s.spawn(move || {
                    start.wait();
                    watcher.on_file_event(path, FileType::Message).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let ingested = outcomes
        .iter()
        .filter(|o| **o == EventOutcome::Ingested)
        .count();
    assert_eq!(ingested, 1, "outcomes: {:?}", outcomes);
    assert!(outcomes.iter().all(|o| matches!(
        o,
        EventOutcome::Ingested | EventOutcome::AlreadyCurrent | EventOutcome::InFlight
    )));
}

#[test]
fn test_non_record_paths_ignored() {
    let storage = TestStorage::new();
    let pipeline = completed_pipeline(&storage);

    let notes = storage.write_raw("message/ses_1/notes.txt", b"hi").unwrap();
    assert_eq!(
        pipeline
            .watcher()
            .on_file_event(&notes, FileType::Message)
            .unwrap(),
        EventOutcome::Ignored
    );
    let stats = pipeline.watcher().ingest_batch(vec![notes]).unwrap();
    assert!(stats.per_type.is_empty());
}
