mod common;

use common::{eventually, settings};
use octrace_runtime::SyncRuntime;
use octrace_testing::{MessageSpec, PartSpec, TestStorage};
use octrace_types::{FileType, SyncPhase};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

/// A build session that delegated to `ses_child`, all written a minute ago.
fn delegation_history(storage: &TestStorage) {
    let paths = vec![
        storage.add_session("ses_root", "proj", 1_000).unwrap(),
        storage.add_session("ses_child", "proj", 1_200).unwrap(),
        storage
            .add_message(&MessageSpec::assistant("msg_r1", "ses_root", "build", 1_100).tokens(100, 10))
            .unwrap(),
        storage
            .add_part(&PartSpec::task("prt_r1", "ses_root", "msg_r1", "ses_child", "map the parser", 1_150))
            .unwrap(),
        storage
            .add_message(&MessageSpec::assistant("msg_c1", "ses_child", "general", 1_210).tokens(40, 4))
            .unwrap(),
    ];
    let past = now_secs() - 60.0;
    for path in &paths {
        storage.set_mtime(path, past).unwrap();
    }
}

#[test]
fn test_bulk_then_live_changes_then_restart() {
    let storage = TestStorage::new();
    delegation_history(&storage);

    let mut runtime = SyncRuntime::start(settings(&storage)).unwrap();
    runtime.coordinator().wait_for_bulk_complete().unwrap();
    assert!(eventually(Duration::from_secs(5), || runtime.summary().bulk.is_some()));

    let bulk = runtime.summary().bulk.unwrap();
    assert_eq!(bulk.total_records(), 5);
    assert_eq!(bulk.get(FileType::Part).records, 1);

    // Written after the cutover: picked up by the watcher or the next scan.
    storage
        .add_message(&MessageSpec::assistant("msg_c2", "ses_child", "general", 1_250).tokens(60, 6))
        .unwrap();
    assert!(eventually(Duration::from_secs(5), || {
        runtime
            .db()
            .lock()
            .unwrap()
            .messages_for_session("ses_child")
            .unwrap()
            .len()
            == 2
    }));

    runtime.build_traces().unwrap();
    {
        let db = runtime.db().lock().unwrap();
        let child = db.get_trace("ses_child").unwrap().unwrap().trace;
        assert_eq!(child.parent_trace_id.as_deref(), Some("ses_root"));
        assert_eq!(child.parent_agent.as_deref(), Some("build"));
        assert_eq!(child.tokens_in, 100);

        let root = db.get_trace("ses_root").unwrap().unwrap().trace;
        assert!(root.is_root());
        assert_eq!(root.tokens_in, 100);
    }

    let summary = runtime.stop().unwrap();
    assert!(summary.last_build.is_some());
    assert_eq!(summary.realtime.get(FileType::Message).records, 1);
    drop(runtime);

    let mut restarted = SyncRuntime::start(settings(&storage)).unwrap();
    assert_eq!(restarted.phase(), Some(SyncPhase::Realtime));
    restarted.coordinator().wait_for_bulk_complete().unwrap();
    assert!(restarted.summary().bulk.is_none());
    assert_eq!(
        restarted.db().lock().unwrap().count_records().unwrap().messages,
        3
    );
    restarted.stop().unwrap();
}

#[test]
fn test_stop_during_startup_is_clean() {
    let storage = TestStorage::new();
    for i in 0..50 {
        let path = storage
            .add_message(&MessageSpec::user(&format!("msg_{:03}", i), "ses_1", 1_000 + i))
            .unwrap();
        storage.set_mtime(&path, now_secs() - 5.0).unwrap();
    }

    let mut runtime = SyncRuntime::start(settings(&storage)).unwrap();
    runtime.stop().unwrap();

    // Either the pass finished before the stop, or it resumes next time.
    let mut again = SyncRuntime::start(settings(&storage)).unwrap();
    again.coordinator().wait_for_bulk_complete().unwrap();
    assert!(eventually(Duration::from_secs(5), || {
        again.db().lock().unwrap().count_records().unwrap().messages == 50
    }));
    again.stop().unwrap();
}

#[test]
fn test_drain_settles_catch_up_before_building() {
    let storage = TestStorage::new();
    SyncRuntime::start(settings(&storage)).unwrap().stop().unwrap();

    // Arrived while nothing was running; far more than one batch.
    for i in 0..150 {
        storage
            .add_session(&format!("ses_{:03}", i), "proj", 1_000 + i)
            .unwrap();
    }

    let mut runtime = SyncRuntime::start(settings(&storage)).unwrap();
    assert_eq!(runtime.phase(), Some(SyncPhase::Realtime));
    runtime.drain().unwrap();

    let report = runtime.build_traces().unwrap();
    assert_eq!(report.traces, 150);
    assert_eq!(
        runtime.db().lock().unwrap().count_records().unwrap().sessions,
        150
    );
    runtime.stop().unwrap();
}
