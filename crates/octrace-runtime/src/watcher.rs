use notify::event::{EventKind, ModifyKind};
use notify::{Event, PollWatcher, RecursiveMode, Watcher};
use octrace_index::IngestBatch;
use octrace_source::{StorageLayout, file_mtime, read_source};
use octrace_types::{FileType, IngestStats};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::channel;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::config::{WatchBackend, WatchConfig};
use crate::coordinator::PhaseCoordinator;
use crate::Result;
use crate::ingest::{Staged, stage};
use crate::ledger::{ClaimGuard, Ledger};

/// What a single file event turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Ingested,
    /// The ledger already covers this mtime.
    AlreadyCurrent,
    /// Another thread is ingesting the same path right now.
    InFlight,
    /// Partial write; left pending for the reconciler.
    NotReady,
    /// Malformed content; recorded as failed.
    Failed,
    Missing,
    /// Not a record file of the storage tree.
    Ignored,
}

enum Claim {
    Current,
    InFlight,
    Claimed(ClaimGuard),
}

/// Real-time ingestion of files at or after the cutover.
///
/// Every entry point waits for the bulk pass first, so the two paths never
/// write the same file concurrently.
#[derive(Clone)]
pub struct RealtimeWatcher {
    layout: StorageLayout,
    ledger: Ledger,
    coordinator: Arc<PhaseCoordinator>,
}

impl RealtimeWatcher {
    pub fn new(layout: StorageLayout, ledger: Ledger, coordinator: Arc<PhaseCoordinator>) -> Self {
        Self {
            layout,
            ledger,
            coordinator,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Ingest one changed file.
    pub fn on_file_event(&self, path: &Path, file_type: FileType) -> Result<EventOutcome> {
        self.coordinator.wait_for_bulk_complete()?;

        if self.layout.classify(path) != Some(file_type) {
            tracing::trace!(path = %path.display(), "not a record file");
            return Ok(EventOutcome::Ignored);
        }

        let key = path.to_string_lossy().into_owned();
        let mtime = match file_mtime(path) {
            Ok(mtime) => mtime,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(EventOutcome::Missing),
            Err(err) => {
                tracing::debug!(path = %key, error = %err, "stat failed, leaving for reconciler");
                return Ok(EventOutcome::NotReady);
            }
        };

        let _claim = match self.claim_stale(&key, mtime)? {
            Claim::Current => return Ok(EventOutcome::AlreadyCurrent),
            Claim::InFlight => return Ok(EventOutcome::InFlight),
            Claim::Claimed(guard) => guard,
        };

        let mut batch = IngestBatch::default();
        let staged = stage(&mut batch, key, file_type, mtime, read_source(path, file_type));
        if !batch.is_empty() {
            self.ledger.commit(&batch)?;
        }

        Ok(match staged {
            Staged::Record => EventOutcome::Ingested,
            Staged::NotReady => EventOutcome::NotReady,
            Staged::Invalid => EventOutcome::Failed,
            Staged::Missing => EventOutcome::Missing,
        })
    }

    fn claim_stale(&self, key: &str, mtime: f64) -> Result<Claim> {
        if self.ledger.is_current(key, mtime)? {
            tracing::debug!(path = %key, mtime, "already ingested, event is a no-op");
            return Ok(Claim::Current);
        }

        let Some(guard) = self.ledger.claim(key)? else {
            tracing::debug!(path = %key, "ingest already in flight");
            return Ok(Claim::InFlight);
        };

        // The previous holder may have finished between the check and the claim.
        if self.ledger.is_current(key, mtime)? {
            tracing::debug!(path = %key, mtime, "already ingested, event is a no-op");
            return Ok(Claim::Current);
        }

        Ok(Claim::Claimed(guard))
    }

    /// Ingest a flushed batch of paths as one small transaction.
    pub fn ingest_batch(&self, paths: Vec<PathBuf>) -> Result<IngestStats> {
        self.coordinator.wait_for_bulk_complete()?;

        let started = Instant::now();
        let mut stats = IngestStats::default();
        let mut batch = IngestBatch::default();
        let mut claims = Vec::with_capacity(paths.len());

        for path in paths {
            let Some(file_type) = self.layout.classify(&path) else {
                tracing::trace!(path = %path.display(), "not a record file");
                continue;
            };
            let entry = stats.entry(file_type);
            entry.files_seen += 1;

            let key = path.to_string_lossy().into_owned();
            let mtime = match file_mtime(&path) {
                Ok(mtime) => mtime,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    tracing::debug!(path = %key, error = %err, "stat failed, leaving for reconciler");
                    entry.not_ready += 1;
                    continue;
                }
            };

            match self.claim_stale(&key, mtime)? {
                Claim::Current => entry.skipped += 1,
                Claim::InFlight => {}
                Claim::Claimed(claim) => {
                    let read = read_source(&path, file_type);
                    stage(&mut batch, key, file_type, mtime, read).count(entry);
                    claims.push(claim);
                }
            }
        }

        if !batch.is_empty() {
            self.ledger.commit(&batch)?;
        }
        drop(claims);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        for type_stats in stats.per_type.values_mut() {
            type_stats.elapsed_ms = elapsed_ms;
        }

        if stats.total_records() > 0 || stats.total_failed() > 0 {
            tracing::info!(
                records = stats.total_records(),
                failed = stats.total_failed(),
                elapsed_ms,
                "realtime batch committed"
            );
        }

        Ok(stats)
    }

    /// Subscribe to filesystem changes under the storage root. Each
    /// created or modified record file is passed to `on_path`; no I/O
    /// happens on the notification thread.
    pub fn watch<F>(&self, config: &WatchConfig, on_path: F) -> Result<WatchHandle>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let (tx, rx) = channel::<Event>();
        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => tracing::warn!(error = %err, "watch backend error"),
        };

        let mut watcher: Box<dyn Watcher + Send> = match config.backend {
            WatchBackend::Native => Box::new(notify::recommended_watcher(handler)?),
            WatchBackend::Poll => Box::new(PollWatcher::new(
                handler,
                notify::Config::default().with_poll_interval(config.poll_interval()),
            )?),
        };
        watcher.watch(self.layout.root(), RecursiveMode::Recursive)?;

        let layout = self.layout.clone();
        let router = std::thread::Builder::new()
            .name("fs-event-router".to_string())
            .spawn(move || {
                // Ends when the watcher, and with it the sender, is dropped
                while let Ok(event) = rx.recv() {
                    if !is_content_change(&event.kind) {
                        continue;
                    }
                    for path in event.paths {
                        if layout.classify(&path).is_some() {
                            on_path(path);
                        }
                    }
                }
            })?;

        tracing::info!(
            root = %self.layout.root().display(),
            backend = ?config.backend,
            "watching storage tree"
        );

        Ok(WatchHandle {
            watcher: Some(watcher),
            router: Some(router),
        })
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Live subscription; dropping it stops the watch.
pub struct WatchHandle {
    watcher: Option<Box<dyn Watcher + Send>>,
    router: Option<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn stop(&mut self) {
        drop(self.watcher.take());
        if let Some(router) = self.router.take()
            && router.join().is_err()
        {
            tracing::error!("fs event router panicked");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind};

    #[test]
    fn test_content_change_kinds() {
        assert!(is_content_change(&EventKind::Create(CreateKind::File)));
        assert!(is_content_change(&EventKind::Modify(ModifyKind::Data(
            DataChange::Any
        ))));
        assert!(!is_content_change(&EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Any
        ))));
        assert!(!is_content_change(&EventKind::Remove(
            notify::event::RemoveKind::File
        )));
    }
}
