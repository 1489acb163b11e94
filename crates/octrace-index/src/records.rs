use octrace_types::{AgentTrace, MessageRecord, PartRecord, SessionRecord};
use serde::{Deserialize, Serialize};

/// Ledger entry counts by status.
///
/// Returned by [`crate::Database::ledger_summary`] for the reporting surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub pending: i64,
    pub processed: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl LedgerSummary {
    pub fn total(&self) -> i64 {
        self.pending + self.processed + self.failed + self.skipped
    }
}

/// Row counts of the raw and derived tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub sessions: i64,
    pub messages: i64,
    pub parts: i64,
    pub traces: i64,
}

/// A persisted trace with the fingerprint of the inputs it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrace {
    pub trace: AgentTrace,
    pub fingerprint: String,
    /// RFC 3339 timestamp of the last write.
    pub built_at: String,
}

/// Everything the trace builder reads from the raw tables.
///
/// Parts are restricted to the kinds the builder uses (tool and text).
#[derive(Debug, Clone, Default)]
pub struct TraceInputs {
    pub sessions: Vec<SessionRecord>,
    pub messages: Vec<MessageRecord>,
    pub parts: Vec<PartRecord>,
}
