use octrace_source::StorageLayout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::Result;
use crate::coordinator::PhaseCoordinator;
use crate::ledger::Ledger;
use crate::periodic::Periodic;

/// Periodic full scan that recovers files the watcher never reported.
pub struct Reconciler {
    layout: StorageLayout,
    ledger: Ledger,
    coordinator: Arc<PhaseCoordinator>,
    worker: Option<Periodic>,
}

impl Reconciler {
    pub fn new(layout: StorageLayout, ledger: Ledger, coordinator: Arc<PhaseCoordinator>) -> Self {
        Self {
            layout,
            ledger,
            coordinator,
            worker: None,
        }
    }

    /// Every record file that is unknown to the ledger, newer than its entry
    /// or still pending. One listing, one query.
    pub fn scan_now(&self) -> Result<Vec<PathBuf>> {
        scan(&self.layout, &self.ledger)
    }

    /// Scan every `interval` and hand stale paths to `on_stale`. Ticks are
    /// skipped until the bulk pass has completed.
    pub fn start<F>(&mut self, interval: Duration, on_stale: F) -> Result<()>
    where
        F: Fn(Vec<PathBuf>) + Send + 'static,
    {
        self.stop();

        let layout = self.layout.clone();
        let ledger = self.ledger.clone();
        let coordinator = Arc::clone(&self.coordinator);

        let worker = Periodic::spawn("reconciler", interval, move || {
            if !coordinator.is_complete() {
                tracing::trace!("bulk pass running, reconcile tick skipped");
                return;
            }

            match scan(&layout, &ledger) {
                Ok(stale) if stale.is_empty() => {}
                Ok(stale) => {
                    tracing::info!(count = stale.len(), "reconciler found stale files");
                    on_stale(stale);
                }
                Err(err) if err.is_fatal() => {
                    tracing::error!(error = %err, "reconcile scan failed");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "reconcile scan failed, retrying next tick");
                }
            }
        })?;

        self.worker = Some(worker);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(Periodic::is_running)
    }
}

fn scan(layout: &StorageLayout, ledger: &Ledger) -> Result<Vec<PathBuf>> {
    let started = Instant::now();

    let listing: Vec<(String, f64)> = layout
        .list_all()?
        .into_iter()
        .map(|file| (file.key(), file.mtime))
        .collect();

    let stale = ledger.stale_paths(&listing)?;

    tracing::debug!(
        listed = listing.len(),
        stale = stale.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "reconcile scan"
    );

    Ok(stale.into_iter().map(PathBuf::from).collect())
}
