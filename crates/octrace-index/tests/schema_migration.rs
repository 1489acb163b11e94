//! Integration tests for schema versioning
//!
//! A writer handle drops and recreates every table on a version mismatch, the
//! ledger included, so the next bulk pass rebuilds a consistent store. Read-only
//! handles refuse to open a mismatched store instead.

use octrace_index::{Database, Error, IngestBatch, SCHEMA_VERSION};
use octrace_types::{FileType, IndexedFile, SessionRecord};
use rusqlite::Connection;
use std::path::Path;
use tempfile::TempDir;

/// Create a store from an older layout that kept the ledger without a status column
fn create_old_schema_db(path: &Path) {
    let conn = Connection::open(path).unwrap();

    conn.execute_batch(
        r#"
        CREATE TABLE indexed_files (
            file_path TEXT PRIMARY KEY,
            last_modified REAL NOT NULL
        );

        CREATE TABLE sessions (
            id TEXT PRIMARY KEY,
            title TEXT
        );

        PRAGMA user_version = 1;
        "#,
    )
    .unwrap();

    conn.execute(
        "INSERT INTO indexed_files (file_path, last_modified) VALUES ('/old/ses_old.json', 1.0)",
        [],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO sessions (id, title) VALUES ('ses_old', 'old')",
        [],
    )
    .unwrap();
}

fn user_version(path: &Path) -> i32 {
    let conn = Connection::open(path).unwrap();
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap()
}

fn session(id: &str) -> SessionRecord {
    SessionRecord {
        id: id.to_string(),
        project_id: None,
        parent_id: None,
        title: Some("kept".to_string()),
        directory: None,
        created_at: 1,
        updated_at: None,
        source_path: format!("/s/session/p/{}.json", id),
    }
}

#[test]
fn test_auto_migration_from_old_schema() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("octrace.db");

    create_old_schema_db(&db_path);
    assert_eq!(user_version(&db_path), 1);

    let db = Database::open(&db_path).expect("Database::open should succeed and migrate");
    assert_eq!(user_version(&db_path), SCHEMA_VERSION);

    // New columns are usable
    db.commit_batch(&IngestBatch {
        sessions: vec![session("ses_new")],
        ledger: vec![IndexedFile::processed(
            "/s/session/p/ses_new.json",
            FileType::Session,
            2.0,
            Some("deadbeef".to_string()),
        )],
        ..Default::default()
    })
    .unwrap();

    assert!(db.is_current("/s/session/p/ses_new.json", 2.0).unwrap());
    assert_eq!(db.get_session("ses_new").unwrap().unwrap().title.as_deref(), Some("kept"));
}

#[test]
fn test_old_data_is_cleared_on_migration() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("octrace.db");

    create_old_schema_db(&db_path);
    let db = Database::open(&db_path).unwrap();

    // The ledger is dropped together with the rows it vouched for
    assert_eq!(db.ledger_summary().unwrap().total(), 0);
    assert!(db.get_session("ses_old").unwrap().is_none());
    assert!(!db.is_current("/old/ses_old.json", 1.0).unwrap());
}

#[test]
fn test_current_version_preserves_data() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("octrace.db");

    let db = Database::open(&db_path).unwrap();
    db.commit_batch(&IngestBatch {
        sessions: vec![session("ses_keep")],
        ledger: vec![IndexedFile::processed(
            "/s/session/p/ses_keep.json",
            FileType::Session,
            3.0,
            None,
        )],
        ..Default::default()
    })
    .unwrap();
    drop(db);

    let db = Database::open(&db_path).unwrap();
    assert!(db.get_session("ses_keep").unwrap().is_some());
    assert!(db.is_current("/s/session/p/ses_keep.json", 3.0).unwrap());
}

#[test]
fn test_read_only_handle_rejects_mismatched_store() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("octrace.db");

    create_old_schema_db(&db_path);

    let err = Database::open_read_only(&db_path)
        .err()
        .expect("read-only open should refuse an old schema");
    assert!(matches!(
        err,
        Error::SchemaMismatch { found: 1, expected } if expected == SCHEMA_VERSION
    ));

    // Nothing was migrated by the failed read-only open
    assert_eq!(user_version(&db_path), 1);
}

#[test]
fn test_read_only_handle_sees_writer_commits() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("octrace.db");

    let writer = Database::open(&db_path).unwrap();
    let reader = Database::open_read_only(&db_path).unwrap();

    writer
        .commit_batch(&IngestBatch {
            sessions: vec![session("ses_live")],
            ..Default::default()
        })
        .unwrap();

    assert!(reader.get_session("ses_live").unwrap().is_some());
    assert_eq!(reader.count_records().unwrap().sessions, 1);
}
