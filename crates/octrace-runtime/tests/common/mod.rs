#![allow(dead_code)]

use octrace_index::Database;
use octrace_runtime::{
    AccumulatorConfig, BulkLoader, Ledger, PhaseCoordinator, RealtimeWatcher, Reconciler,
    RuntimeSettings, SharedDb, WatchBackend, WatchConfig, shared,
};
use octrace_source::StorageLayout;
use octrace_testing::TestStorage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cutover used by tests that pin mtimes.
pub const T0: f64 = 1_700_000_000.0;

/// The components of one process, wired to a storage tree.
pub struct Pipeline {
    pub db: SharedDb,
    pub ledger: Ledger,
    pub coordinator: Arc<PhaseCoordinator>,
    pub layout: StorageLayout,
}

impl Pipeline {
    pub fn open(storage: &TestStorage) -> Self {
        let db = shared(Database::open(&storage.db_path()).unwrap());
        let ledger = Ledger::new(Arc::clone(&db));
        let coordinator = Arc::new(PhaseCoordinator::new(Arc::clone(&db)));
        let layout = StorageLayout::new(storage.storage_root());
        Self {
            db,
            ledger,
            coordinator,
            layout,
        }
    }

    pub fn bulk_loader(&self) -> BulkLoader {
        BulkLoader::new(
            self.layout.clone(),
            self.ledger.clone(),
            Arc::clone(&self.coordinator),
        )
    }

    pub fn watcher(&self) -> RealtimeWatcher {
        RealtimeWatcher::new(
            self.layout.clone(),
            self.ledger.clone(),
            Arc::clone(&self.coordinator),
        )
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.layout.clone(),
            self.ledger.clone(),
            Arc::clone(&self.coordinator),
        )
    }

    pub fn db(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().unwrap()
    }
}

pub fn settings(storage: &TestStorage) -> RuntimeSettings {
    RuntimeSettings {
        storage_root: storage.storage_root().to_path_buf(),
        database: storage.db_path(),
        batch: AccumulatorConfig {
            max_items: 10,
            window: Duration::from_millis(20),
        },
        reconcile_interval: Duration::from_millis(200),
        trace_interval: Duration::from_secs(3600),
        watch: WatchConfig {
            backend: WatchBackend::Poll,
            poll_interval_ms: 50,
        },
        build: Default::default(),
    }
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn eventually<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    cond()
}
