use octrace_engine::BuildOptions;
use octrace_index::Database;
use octrace_source::StorageLayout;
use octrace_types::{IngestStats, SyncPhase};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::accumulator::{AccumulatorConfig, BatchAccumulator};
use crate::bulk_loader::BulkLoader;
use crate::config::WatchConfig;
use crate::coordinator::{PhaseCoordinator, Recovery};
use crate::ledger::{Ledger, SharedDb, shared};
use crate::periodic::Periodic;
use crate::reconciler::Reconciler;
use crate::trace_job::{BuildReport, TraceJob};
use crate::watcher::{RealtimeWatcher, WatchHandle};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub storage_root: PathBuf,
    pub database: PathBuf,
    pub batch: AccumulatorConfig,
    pub reconcile_interval: Duration,
    pub trace_interval: Duration,
    pub watch: WatchConfig,
    pub build: BuildOptions,
}

/// Counters for the reporting surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Present once a bulk pass finished in this process.
    pub bulk: Option<IngestStats>,
    pub realtime: IngestStats,
    pub last_build: Option<BuildReport>,
}

#[derive(Default)]
struct RunState {
    summary: Mutex<RunSummary>,
    fatal: Mutex<Option<Error>>,
}

impl RunState {
    fn update<F: FnOnce(&mut RunSummary)>(&self, f: F) {
        if let Ok(mut summary) = self.summary.lock() {
            f(&mut summary);
        }
    }

    fn fail(&self, err: Error) {
        tracing::error!(error = %err, "fatal runtime error");
        if let Ok(mut slot) = self.fatal.lock()
            && slot.is_none()
        {
            *slot = Some(err);
        }
    }

    /// Keep fatal errors for the run loop, log the rest.
    fn report(&self, context: &str, err: Error) {
        match err {
            Error::Cancelled(reason) => tracing::debug!(reason = %reason, "{} cancelled", context),
            err if err.is_fatal() => self.fail(err),
            err => tracing::warn!(error = %err, "{} failed", context),
        }
    }

    fn record_build(&self, result: Result<BuildReport>) {
        match result {
            Ok(report) => self.update(|s| s.last_build = Some(report)),
            Err(err) => self.report("trace build", err),
        }
    }
}

fn now_epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// The whole ingestion pipeline.
///
/// `start` subscribes to the storage tree first, so events raised during the
/// bulk pass buffer in the accumulator, then runs the bulk pass on its own
/// worker. Reconciler and trace job tick on timers but do nothing until the
/// cutover completes.
pub struct SyncRuntime {
    db: SharedDb,
    coordinator: Arc<PhaseCoordinator>,
    accumulator: Arc<BatchAccumulator>,
    reconciler: Reconciler,
    trace_job: TraceJob,
    watch: Option<WatchHandle>,
    bulk: Option<JoinHandle<()>>,
    trace_worker: Option<Periodic>,
    cancel: Arc<AtomicBool>,
    state: Arc<RunState>,
    stopped: bool,
}

impl SyncRuntime {
    pub fn start(settings: RuntimeSettings) -> Result<Self> {
        let db = shared(Database::open(&settings.database)?);
        let layout = StorageLayout::new(&settings.storage_root);
        layout.ensure_exists()?;

        let ledger = Ledger::new(Arc::clone(&db));
        let coordinator = Arc::new(PhaseCoordinator::new(Arc::clone(&db)));
        let recovery = coordinator.recover()?;

        let state = Arc::new(RunState::default());
        let cancel = Arc::new(AtomicBool::new(false));
        let trace_job = TraceJob::new(Arc::clone(&db), settings.build);
        let watcher = RealtimeWatcher::new(layout.clone(), ledger.clone(), Arc::clone(&coordinator));

        let accumulator = {
            let watcher = watcher.clone();
            let state = Arc::clone(&state);
            let on_flush = move |paths: Vec<PathBuf>| match watcher.ingest_batch(paths) {
                Ok(stats) => state.update(|s| s.realtime.merge(&stats)),
                Err(err) => state.report("realtime batch", err),
            };
            // Events seen during the bulk pass stay buffered until cutover.
            let accumulator = match recovery {
                Recovery::Complete { .. } => BatchAccumulator::start(settings.batch, on_flush)?,
                _ => BatchAccumulator::start_held(settings.batch, on_flush)?,
            };
            Arc::new(accumulator)
        };

        let watch = {
            let accumulator = Arc::clone(&accumulator);
            watcher.watch(&settings.watch, move |path| {
                if let Err(err) = accumulator.add(path) {
                    tracing::warn!(error = %err, "dropping file event");
                }
            })?
        };

        let mut reconciler = Reconciler::new(layout.clone(), ledger.clone(), Arc::clone(&coordinator));

        let bulk = match recovery {
            Recovery::Complete { .. } => {
                // Catch up on whatever changed while no process was running.
                let stale = reconciler.scan_now()?;
                tracing::info!(stale = stale.len(), "bulk pass already complete, catching up");
                accumulator.add_many(stale)?;
                None
            }
            Recovery::Fresh | Recovery::ResumeBulk { .. } => {
                let loader = BulkLoader::new(layout, ledger, Arc::clone(&coordinator))
                    .with_cancel(Arc::clone(&cancel));
                let coordinator = Arc::clone(&coordinator);
                let state = Arc::clone(&state);
                let job = trace_job.clone();
                let buffered = Arc::clone(&accumulator);

                let handle = std::thread::Builder::new()
                    .name("bulk-loader".to_string())
                    .spawn(move || match loader.load_all(now_epoch_secs()) {
                        Ok(stats) => {
                            state.update(|s| s.bulk = Some(stats));
                            if let Err(err) = buffered.release() {
                                state.report("releasing buffered events", err);
                            }
                            state.record_build(job.run_once());
                        }
                        Err(Error::Cancelled(reason)) => {
                            tracing::info!(reason = %reason, "bulk pass stopped");
                            coordinator.abort(reason);
                        }
                        Err(err) => {
                            coordinator.abort(format!("bulk pass failed: {}", err));
                            state.fail(err);
                        }
                    })?;
                Some(handle)
            }
        };

        {
            let accumulator = Arc::clone(&accumulator);
            reconciler.start(settings.reconcile_interval, move |paths| {
                if let Err(err) = accumulator.add_many(paths) {
                    tracing::warn!(error = %err, "dropping reconciled paths");
                }
            })?;
        }

        let trace_worker = {
            let job = trace_job.clone();
            let coordinator = Arc::clone(&coordinator);
            let state = Arc::clone(&state);
            Periodic::spawn("trace-job", settings.trace_interval, move || {
                if coordinator.is_complete() {
                    state.record_build(job.run_once());
                }
            })?
        };

        tracing::info!(
            storage = %settings.storage_root.display(),
            database = %settings.database.display(),
            "sync runtime started"
        );

        Ok(Self {
            db,
            coordinator,
            accumulator,
            reconciler,
            trace_job,
            watch: Some(watch),
            bulk,
            trace_worker: Some(trace_worker),
            cancel,
            state,
            stopped: false,
        })
    }

    pub fn db(&self) -> &SharedDb {
        &self.db
    }

    pub fn coordinator(&self) -> &Arc<PhaseCoordinator> {
        &self.coordinator
    }

    pub fn phase(&self) -> Option<SyncPhase> {
        self.coordinator.phase()
    }

    pub fn summary(&self) -> RunSummary {
        self.state
            .summary
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Message of the first fatal error, if one occurred. The run loop
    /// should stop when this turns `Some`.
    pub fn fatal_error(&self) -> Option<String> {
        self.state
            .fatal
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|e| e.to_string()))
    }

    /// Scan now and queue stale files. Returns how many were queued.
    pub fn reconcile_now(&self) -> Result<usize> {
        let stale = self.reconciler.scan_now()?;
        self.accumulator.add_many(stale)
    }

    /// Flush buffered paths on the calling thread and wait for batches
    /// already handed to flush workers, so the raw tables are settled.
    pub fn drain(&self) -> Result<usize> {
        self.accumulator.drain()
    }

    pub fn build_traces(&self) -> Result<BuildReport> {
        let report = self.trace_job.run_once()?;
        self.state.update(|s| s.last_build = Some(report));
        Ok(report)
    }

    /// Stop every worker, flushing buffered paths, and surface a fatal
    /// storage error if one occurred.
    pub fn stop(&mut self) -> Result<RunSummary> {
        if self.stopped {
            return Ok(self.summary());
        }
        self.stopped = true;
        tracing::info!("stopping sync runtime");

        self.cancel.store(true, Ordering::SeqCst);
        if let Some(mut watch) = self.watch.take() {
            watch.stop();
        }

        if let Some(bulk) = self.bulk.take()
            && bulk.join().is_err()
        {
            self.state
                .fail(Error::InvalidOperation("bulk loader panicked".to_string()));
        }

        self.reconciler.stop();
        if let Some(mut worker) = self.trace_worker.take() {
            worker.stop();
        }

        // Release flush workers parked on an unfinished bulk pass; their
        // paths are recovered by the reconciler after the next cutover.
        if !self.coordinator.is_complete() {
            self.coordinator.abort("runtime stopped");
        }
        match self.accumulator.stop() {
            Ok(flushed) => tracing::debug!(flushed, "final flush"),
            Err(err) => self.state.report("final flush", err),
        }

        let fatal = self.state.fatal.lock().ok().and_then(|mut slot| slot.take());
        match fatal {
            Some(err) => Err(err),
            None => Ok(self.summary()),
        }
    }
}

impl Drop for SyncRuntime {
    fn drop(&mut self) {
        if !self.stopped {
            let _ = self.stop();
        }
    }
}
