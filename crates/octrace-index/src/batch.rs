use octrace_types::{IndexedFile, MessageRecord, PartRecord, SessionRecord};

/// Raw rows plus the ledger stamps that vouch for them, committed in one
/// transaction by [`crate::Database::commit_batch`].
///
/// A crash either keeps a file's rows and its ledger entry or neither.
#[derive(Debug, Clone, Default)]
pub struct IngestBatch {
    pub sessions: Vec<SessionRecord>,
    pub messages: Vec<MessageRecord>,
    pub parts: Vec<PartRecord>,
    pub ledger: Vec<IndexedFile>,
}

impl IngestBatch {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
            && self.messages.is_empty()
            && self.parts.is_empty()
            && self.ledger.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.sessions.len() + self.messages.len() + self.parts.len()
    }
}

/// Rows written by one committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounts {
    pub sessions: usize,
    pub messages: usize,
    pub parts: usize,
    pub ledger: usize,
}

impl BatchCounts {
    pub fn records(&self) -> usize {
        self.sessions + self.messages + self.parts
    }
}
