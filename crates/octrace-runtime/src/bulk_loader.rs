use octrace_index::IngestBatch;
use octrace_source::{SourceFile, SourceRead, StorageLayout, read_source};
use octrace_types::{FileType, IngestStats, TypeStats};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::coordinator::PhaseCoordinator;
use crate::ingest::{Staged, stage};
use crate::ledger::Ledger;
use crate::{Error, Result};

/// Files parsed in parallel and committed per transaction.
const BULK_CHUNK: usize = 2000;

/// One-shot ingestion of everything older than the cutover.
pub struct BulkLoader {
    layout: StorageLayout,
    ledger: Ledger,
    coordinator: Arc<PhaseCoordinator>,
    cancel: Arc<AtomicBool>,
}

impl BulkLoader {
    pub fn new(layout: StorageLayout, ledger: Ledger, coordinator: Arc<PhaseCoordinator>) -> Self {
        Self {
            layout,
            ledger,
            coordinator,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a cancel flag; checked between chunks.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ingest every file with mtime strictly below `cutoff_time`, then flip
    /// the coordinator to realtime.
    ///
    /// Resuming after a crash reuses the persisted cutover; files the ledger
    /// already covers are counted as skipped and not read again.
    pub fn load_all(&self, cutoff_time: f64) -> Result<IngestStats> {
        let cutover = self.coordinator.start_bulk(cutoff_time)?;

        let mut by_type = Vec::with_capacity(FileType::ALL.len());
        let mut total = 0;
        for file_type in FileType::ALL {
            let files: Vec<SourceFile> = self
                .layout
                .list(file_type)?
                .into_iter()
                .filter(|f| f.mtime < cutover)
                .collect();
            total += files.len();
            by_type.push((file_type, files));
        }

        self.coordinator.set_total(total as i64)?;
        tracing::info!(cutover, files = total, "bulk pass listed pre-cutover files");

        let mut stats = IngestStats::default();
        for (file_type, files) in by_type {
            let type_stats = self.load_type(file_type, files)?;
            *stats.entry(file_type) = type_stats;
        }

        self.coordinator.complete_bulk()?;
        Ok(stats)
    }

    fn load_type(&self, file_type: FileType, files: Vec<SourceFile>) -> Result<TypeStats> {
        let started = Instant::now();
        let mut stats = TypeStats {
            files_seen: files.len(),
            ..TypeStats::default()
        };

        let listing: Vec<(String, f64)> = files.iter().map(|f| (f.key(), f.mtime)).collect();
        let stale: HashSet<String> = self.ledger.stale_paths(&listing)?.into_iter().collect();
        let (todo, current): (Vec<SourceFile>, Vec<SourceFile>) =
            files.into_iter().partition(|f| stale.contains(&f.key()));

        stats.skipped = current.len();
        if !current.is_empty() {
            tracing::debug!(file_type = %file_type, count = current.len(), "already in ledger");
            self.coordinator.record_marked(current.len() as i64)?;
        }

        for chunk in todo.chunks(BULK_CHUNK) {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(Error::Cancelled("bulk pass interrupted".to_string()));
            }

            let reads: Vec<SourceRead> = chunk
                .par_iter()
                .map(|f| read_source(&f.path, file_type))
                .collect();

            let mut batch = IngestBatch::default();
            let mut vanished = 0;
            for (file, read) in chunk.iter().zip(reads) {
                let staged = stage(&mut batch, file.key(), file_type, file.mtime, read);
                if staged == Staged::Missing {
                    vanished += 1;
                }
                staged.count(&mut stats);
            }

            self.ledger.commit(&batch)?;
            self.coordinator
                .record_marked((batch.ledger.len() + vanished) as i64)?;
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            file_type = %file_type,
            files = stats.files_seen,
            records = stats.records,
            failed = stats.failed,
            not_ready = stats.not_ready,
            skipped = stats.skipped,
            elapsed_ms = stats.elapsed_ms,
            "bulk load finished"
        );

        Ok(stats)
    }
}
