use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::FileType;

/// Counters for one file type within an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    /// Files listed for this run.
    pub files_seen: usize,
    /// Rows written to the raw table.
    pub records: usize,
    pub failed: usize,
    /// Files left pending because they were not readable yet.
    pub not_ready: usize,
    /// Files the ledger already covered.
    pub skipped: usize,
    pub elapsed_ms: u64,
}

/// Ingestion statistics consumed by the reporting surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub per_type: BTreeMap<FileType, TypeStats>,
}

impl IngestStats {
    pub fn entry(&mut self, file_type: FileType) -> &mut TypeStats {
        self.per_type.entry(file_type).or_default()
    }

    pub fn get(&self, file_type: FileType) -> TypeStats {
        self.per_type.get(&file_type).cloned().unwrap_or_default()
    }

    pub fn total_records(&self) -> usize {
        self.per_type.values().map(|s| s.records).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.per_type.values().map(|s| s.failed).sum()
    }

    pub fn merge(&mut self, other: &IngestStats) {
        for (file_type, stats) in &other.per_type {
            let entry = self.entry(*file_type);
            entry.files_seen += stats.files_seen;
            entry.records += stats.records;
            entry.failed += stats.failed;
            entry.not_ready += stats.not_ready;
            entry.skipped += stats.skipped;
            entry.elapsed_ms += stats.elapsed_ms;
        }
    }
}
