use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Ingestion phase. Moves `Bulk -> Realtime` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Bulk,
    Realtime,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Bulk => "bulk",
            SyncPhase::Realtime => "realtime",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncPhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bulk" => Ok(SyncPhase::Bulk),
            "realtime" => Ok(SyncPhase::Realtime),
            other => Err(Error::unknown("sync phase", other)),
        }
    }
}

/// Process-wide coordination record, persisted as a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub phase: SyncPhase,
    /// Cutover instant T0 as float epoch seconds. Files with mtime < T0 belong
    /// to the bulk pass.
    pub cutover_time: f64,
    pub total_files_at_cutover: i64,
    pub files_marked: i64,
}

impl SyncState {
    pub fn bulk(cutover_time: f64) -> Self {
        Self {
            phase: SyncPhase::Bulk,
            cutover_time,
            total_files_at_cutover: 0,
            files_marked: 0,
        }
    }

    /// True if `mtime` falls on the bulk side of the cutover.
    pub fn is_pre_cutover(&self, mtime: f64) -> bool {
        mtime < self.cutover_time
    }
}
