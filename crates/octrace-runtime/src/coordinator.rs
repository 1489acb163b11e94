use octrace_types::{SyncPhase, SyncState};
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::ledger::{SharedDb, lock};
use crate::{Error, Result};

/// What the persisted sync state says about the previous run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recovery {
    /// No state on record; a bulk pass has never started.
    Fresh,
    /// A bulk pass was interrupted and resumes with its original cutover.
    ResumeBulk { cutover_time: f64, files_marked: i64 },
    /// Bulk already completed; go straight to real-time ingestion.
    Complete { cutover_time: f64 },
}

#[derive(Default)]
struct Gate {
    state: Option<SyncState>,
    aborted: Option<String>,
}

/// One-way `bulk -> realtime` state machine, persisted in `sync_state`.
///
/// Lock order is gate then database; nothing takes the gate while holding the
/// database lock.
pub struct PhaseCoordinator {
    db: SharedDb,
    gate: Mutex<Gate>,
    ready: Condvar,
}

impl PhaseCoordinator {
    pub fn new(db: SharedDb) -> Self {
        Self {
            db,
            gate: Mutex::new(Gate::default()),
            ready: Condvar::new(),
        }
    }

    fn gate(&self) -> Result<MutexGuard<'_, Gate>> {
        self.gate.lock().map_err(|_| Error::Poisoned("phase gate"))
    }

    fn persist(&self, state: &SyncState) -> Result<()> {
        lock(&self.db)?.save_sync_state(state)?;
        Ok(())
    }

    /// Load the persisted phase. Call once at startup before anything else.
    pub fn recover(&self) -> Result<Recovery> {
        let persisted = lock(&self.db)?.load_sync_state()?;
        let mut gate = self.gate()?;

        let recovery = match &persisted {
            None => Recovery::Fresh,
            Some(state) if state.phase == SyncPhase::Realtime => Recovery::Complete {
                cutover_time: state.cutover_time,
            },
            Some(state) => Recovery::ResumeBulk {
                cutover_time: state.cutover_time,
                files_marked: state.files_marked,
            },
        };

        tracing::info!(?recovery, "recovered sync state");
        gate.state = persisted;
        if recovery != Recovery::Fresh {
            self.ready.notify_all();
        }
        Ok(recovery)
    }

    /// Record the cutover T0 before any bulk work. Returns the effective
    /// cutover, which is the persisted one when an interrupted pass resumes.
    pub fn start_bulk(&self, cutover_time: f64) -> Result<f64> {
        let mut gate = self.gate()?;

        match &gate.state {
            Some(state) if state.phase == SyncPhase::Realtime => Err(Error::InvalidOperation(
                "bulk pass already completed".to_string(),
            )),
            Some(state) => {
                tracing::info!(cutover = state.cutover_time, "resuming bulk pass");
                Ok(state.cutover_time)
            }
            None => {
                let state = SyncState::bulk(cutover_time);
                self.persist(&state)?;
                gate.state = Some(state);
                tracing::info!(cutover = cutover_time, "bulk pass started");
                Ok(cutover_time)
            }
        }
    }

    fn update_bulk<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SyncState),
    {
        let mut gate = self.gate()?;
        let state = match gate.state.as_mut() {
            Some(state) if state.phase == SyncPhase::Bulk => state,
            _ => {
                return Err(Error::InvalidOperation(
                    "no bulk pass in progress".to_string(),
                ));
            }
        };

        let mut next = state.clone();
        f(&mut next);
        self.persist(&next)?;
        *state = next;
        Ok(())
    }

    /// Number of files below the cutover. Resets the marked counter, which
    /// the loader re-derives from the ledger on resume.
    pub fn set_total(&self, total: i64) -> Result<()> {
        self.update_bulk(|state| {
            state.total_files_at_cutover = total;
            state.files_marked = 0;
        })
    }

    pub fn record_marked(&self, count: i64) -> Result<()> {
        self.update_bulk(|state| state.files_marked += count)
    }

    /// Flip to `realtime` and release every waiter.
    pub fn complete_bulk(&self) -> Result<()> {
        let mut gate = self.gate()?;
        let state = match gate.state.as_mut() {
            Some(state) if state.phase == SyncPhase::Bulk => state,
            Some(_) => {
                return Err(Error::InvalidOperation(
                    "bulk pass already completed".to_string(),
                ));
            }
            None => {
                return Err(Error::InvalidOperation(
                    "bulk pass was never started".to_string(),
                ));
            }
        };

        if state.files_marked < state.total_files_at_cutover {
            return Err(Error::InvalidOperation(format!(
                "only {} of {} pre-cutover files marked",
                state.files_marked, state.total_files_at_cutover
            )));
        }

        let mut next = state.clone();
        next.phase = SyncPhase::Realtime;
        self.persist(&next)?;
        *state = next;

        tracing::info!(
            cutover = state.cutover_time,
            files = state.total_files_at_cutover,
            "bulk pass complete, switching to realtime"
        );
        self.ready.notify_all();
        Ok(())
    }

    /// Block until the bulk pass completes. No timeout: only completion or
    /// [`PhaseCoordinator::abort`] releases the caller.
    pub fn wait_for_bulk_complete(&self) -> Result<()> {
        let mut gate = self.gate()?;
        loop {
            if let Some(reason) = &gate.aborted {
                return Err(Error::Cancelled(reason.clone()));
            }
            if gate
                .state
                .as_ref()
                .is_some_and(|s| s.phase == SyncPhase::Realtime)
            {
                return Ok(());
            }
            gate = self
                .ready
                .wait(gate)
                .map_err(|_| Error::Poisoned("phase gate"))?;
        }
    }

    /// Release waiters with an error; used on shutdown and bulk failure.
    pub fn abort(&self, reason: impl Into<String>) {
        if let Ok(mut gate) = self.gate.lock() {
            if gate.aborted.is_none() {
                gate.aborted = Some(reason.into());
            }
            self.ready.notify_all();
        }
    }

    pub fn phase(&self) -> Option<SyncPhase> {
        self.snapshot().map(|s| s.phase)
    }

    pub fn cutover(&self) -> Option<f64> {
        self.snapshot().map(|s| s.cutover_time)
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == Some(SyncPhase::Realtime)
    }

    pub fn snapshot(&self) -> Option<SyncState> {
        self.gate.lock().ok().and_then(|g| g.state.clone())
    }
}
