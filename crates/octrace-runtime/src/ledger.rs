use octrace_index::{BatchCounts, Database, IngestBatch};
use octrace_types::IndexedFile;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Error, Result};

/// The single writer connection shared by every ingestion path.
pub type SharedDb = Arc<Mutex<Database>>;

pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}

pub(crate) fn lock(db: &SharedDb) -> Result<MutexGuard<'_, Database>> {
    db.lock().map_err(|_| Error::Poisoned("database"))
}

/// Thread-safe handle on the ingestion ledger.
///
/// Every write goes through the one shared connection, so check-then-mark is
/// serialized. `claim` additionally keeps two threads from parsing the same
/// path at once.
#[derive(Clone)]
pub struct Ledger {
    db: SharedDb,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

/// Held while a path is being ingested; releases the claim on drop.
#[must_use]
pub struct ClaimGuard {
    path: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ClaimGuard {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.path);
        }
    }
}

impl Ledger {
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn db(&self) -> &SharedDb {
        &self.db
    }

    pub fn is_current(&self, path: &str, mtime: f64) -> Result<bool> {
        Ok(lock(&self.db)?.is_current(path, mtime)?)
    }

    pub fn get(&self, path: &str) -> Result<Option<IndexedFile>> {
        Ok(lock(&self.db)?.get_indexed_file(path)?)
    }

    pub fn mark(&self, entry: &IndexedFile) -> Result<bool> {
        Ok(lock(&self.db)?.mark_file(entry)?)
    }

    pub fn mark_batch(&self, entries: &[IndexedFile]) -> Result<usize> {
        Ok(lock(&self.db)?.mark_files(entries)?)
    }

    pub fn stale_paths(&self, listing: &[(String, f64)]) -> Result<Vec<String>> {
        Ok(lock(&self.db)?.stale_paths(listing)?)
    }

    /// Write raw rows and their ledger entries in one transaction.
    pub fn commit(&self, batch: &IngestBatch) -> Result<BatchCounts> {
        Ok(lock(&self.db)?.commit_batch(batch)?)
    }

    /// Claim `path` for ingestion. `None` if another thread holds it.
    pub fn claim(&self, path: &str) -> Result<Option<ClaimGuard>> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| Error::Poisoned("ledger claims"))?;

        if !set.insert(path.to_string()) {
            return Ok(None);
        }

        Ok(Some(ClaimGuard {
            path: path.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        }))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octrace_types::{FileStatus, FileType};

    fn ledger() -> Ledger {
        Ledger::new(shared(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let ledger = ledger();

        let first = ledger.claim("/s/part/m/p.json").unwrap();
        assert!(first.is_some());
        assert!(ledger.claim("/s/part/m/p.json").unwrap().is_none());
        assert!(ledger.claim("/s/part/m/other.json").unwrap().is_some());

        drop(first);
        assert_eq!(ledger.in_flight(), 0);
        assert!(ledger.claim("/s/part/m/p.json").unwrap().is_some());
    }

    #[test]
    fn test_claims_shared_across_clones() {
        let ledger = ledger();
        let clone = ledger.clone();

        let _guard = ledger.claim("/a.json").unwrap().unwrap();
        assert!(clone.claim("/a.json").unwrap().is_none());
    }

    #[test]
    fn test_mark_then_is_current() {
        let ledger = ledger();
        let entry = IndexedFile::processed("/a.json", FileType::Session, 12.5, None);

        assert!(!ledger.is_current("/a.json", 12.5).unwrap());
        assert!(ledger.mark(&entry).unwrap());
        assert!(ledger.is_current("/a.json", 12.5).unwrap());

        // Idempotent
        ledger.mark(&entry).unwrap();
        assert_eq!(ledger.get("/a.json").unwrap().unwrap().status, FileStatus::Processed);
    }

    #[test]
    fn test_concurrent_claims_grant_exactly_one() {
        let ledger = ledger();
        let start = std::sync::Barrier::new(8);
        let tried = std::sync::Barrier::new(8);
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let ledger = ledger.clone();
                    let (start, tried) = (&start, &tried);
                    s.spawn(move || {
                        start.wait();
                        let guard = ledger.claim("/race.json").unwrap();
                        let won = guard.is_some();
                        // Hold the claim until every thread has tried
                        tried.wait();
                        drop(guard);
                        usize::from(won)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }
}
