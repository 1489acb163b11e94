//! Reconciliation scan over a storage-sized ledger
//!
//! `stale_paths` must answer for ~10^5 files in one set-oriented pass, well
//! inside a reconcile interval.

use octrace_index::Database;
use octrace_types::{FileStatus, FileType, IndexedFile};
use std::time::{Duration, Instant};

const FILES: usize = 100_000;

fn path(i: usize) -> String {
    format!("/storage/part/msg_{:05}/prt_{:06}.json", i / 100, i)
}

fn mtime(i: usize) -> f64 {
    1_700_000_000.0 + i as f64 / 1000.0
}

#[test]
fn test_stale_scan_over_hundred_thousand_files() {
    let db = Database::open_in_memory().unwrap();

    let mut entries: Vec<IndexedFile> = (0..FILES)
        .map(|i| IndexedFile::processed(path(i), FileType::Part, mtime(i), None))
        .collect();
    entries[500] = entries[500]
        .clone()
        .with_status(FileStatus::Pending, Some("unexpected end of input".to_string()));
    entries[600] = entries[600]
        .clone()
        .with_status(FileStatus::Failed, Some("unknown part type".to_string()));
    assert_eq!(db.mark_files(&entries).unwrap(), FILES);

    let mut listing: Vec<(String, f64)> = (0..FILES).map(|i| (path(i), mtime(i))).collect();
    // Rewritten since the last stamp
    for i in [7, 42_000, 99_999] {
        listing[i].1 += 5.0;
    }
    // Never seen
    listing.push((path(FILES), mtime(FILES)));
    listing.push((path(FILES + 1), mtime(FILES + 1)));

    let started = Instant::now();
    let stale = db.stale_paths(&listing).unwrap();
    let elapsed = started.elapsed();

    let mut expected: Vec<String> = [7, 500, 42_000, 99_999, FILES, FILES + 1]
        .into_iter()
        .map(path)
        .collect();
    expected.sort();
    assert_eq!(stale, expected);

    // Unoptimized SQLite in debug builds gets more room.
    let budget = if cfg!(debug_assertions) {
        Duration::from_secs(10)
    } else {
        Duration::from_secs(1)
    };
    assert!(elapsed < budget, "scan took {:?}", elapsed);
}

#[test]
fn test_stale_scan_repeats_without_leftovers() {
    let db = Database::open_in_memory().unwrap();
    let listing: Vec<(String, f64)> = (0..1_000).map(|i| (path(i), mtime(i))).collect();

    assert_eq!(db.stale_paths(&listing).unwrap().len(), 1_000);

    let entries: Vec<IndexedFile> = listing
        .iter()
        .map(|(p, m)| IndexedFile::processed(p.as_str(), FileType::Part, *m, None))
        .collect();
    db.mark_files(&entries).unwrap();

    // The temp listing from the previous scan must not leak into this one
    assert!(db.stale_paths(&listing[..10]).unwrap().is_empty());
}
