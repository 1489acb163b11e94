use octrace_types::{FileStatus, IndexedFile, SessionRecord, SyncState};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

use crate::batch::{BatchCounts, IngestBatch};
use crate::queries::{self, ledger, message, part, session, sync_state, trace};
use crate::records::{LedgerSummary, RecordCounts, StoredTrace, TraceInputs};
use crate::schema::{self, SCHEMA_VERSION};
use crate::{Error, Result};

/// Handle on the analytical store.
///
/// A writer handle (`open`) owns the schema; the runtime shares exactly one of
/// them behind a mutex. Any number of `open_read_only` handles may query
/// concurrently (WAL mode).
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open a query-only handle. Never migrates.
    pub fn open_read_only(db_path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let found = schema::schema_version(&conn)?;
        if found != SCHEMA_VERSION {
            return Err(Error::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(Self { conn })
    }

    pub fn init_schema(&self) -> Result<()> {
        schema::init_schema(&self.conn)
    }

    // Ledger

    pub fn is_current(&self, file_path: &str, mtime: f64) -> Result<bool> {
        ledger::is_current(&self.conn, file_path, mtime)
    }

    pub fn get_indexed_file(&self, file_path: &str) -> Result<Option<IndexedFile>> {
        ledger::get(&self.conn, file_path)
    }

    /// Idempotent upsert of one ledger entry. Returns false if the ledger
    /// already holds a newer version of the path.
    pub fn mark_file(&self, entry: &IndexedFile) -> Result<bool> {
        ledger::mark(&self.conn, entry)
    }

    /// Stamp many paths in one transaction.
    pub fn mark_files(&self, entries: &[IndexedFile]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let written = ledger::mark_batch(&tx, entries)?;
        tx.commit()?;
        Ok(written)
    }

    /// Paths of `listing` that the ledger does not cover.
    pub fn stale_paths(&self, listing: &[(String, f64)]) -> Result<Vec<String>> {
        ledger::stale_paths(&self.conn, listing)
    }

    pub fn failed_files(&self, limit: Option<usize>) -> Result<Vec<IndexedFile>> {
        ledger::list_by_status(&self.conn, FileStatus::Failed, limit)
    }

    pub fn pending_files(&self, limit: Option<usize>) -> Result<Vec<IndexedFile>> {
        ledger::list_by_status(&self.conn, FileStatus::Pending, limit)
    }

    pub fn ledger_summary(&self) -> Result<LedgerSummary> {
        ledger::summary(&self.conn)
    }

    // Raw tables

    /// Write rows and their ledger stamps atomically.
    pub fn commit_batch(&self, batch: &IngestBatch) -> Result<BatchCounts> {
        let tx = self.conn.unchecked_transaction()?;

        for record in &batch.sessions {
            session::upsert(&tx, record)?;
        }
        for record in &batch.messages {
            message::upsert(&tx, record)?;
        }
        for record in &batch.parts {
            part::upsert(&tx, record)?;
        }
        let ledger = ledger::mark_batch(&tx, &batch.ledger)?;

        tx.commit()?;

        Ok(BatchCounts {
            sessions: batch.sessions.len(),
            messages: batch.messages.len(),
            parts: batch.parts.len(),
            ledger,
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        session::get(&self.conn, session_id)
    }

    pub fn messages_for_session(&self, session_id: &str) -> Result<Vec<octrace_types::MessageRecord>> {
        message::list_for_session(&self.conn, session_id)
    }

    pub fn parts_for_message(&self, message_id: &str) -> Result<Vec<octrace_types::PartRecord>> {
        part::list_for_message(&self.conn, message_id)
    }

    /// Load the raw rows the trace builder needs.
    pub fn load_trace_inputs(&self) -> Result<TraceInputs> {
        Ok(TraceInputs {
            sessions: session::list_all(&self.conn)?,
            messages: message::list_all(&self.conn)?,
            parts: part::list_trace_relevant(&self.conn)?,
        })
    }

    pub fn count_records(&self) -> Result<RecordCounts> {
        Ok(RecordCounts {
            sessions: session::count(&self.conn)?,
            messages: message::count(&self.conn)?,
            parts: part::count(&self.conn)?,
            traces: trace::count(&self.conn)?,
        })
    }

    // Traces

    pub fn trace_fingerprints(&self) -> Result<std::collections::HashMap<String, String>> {
        trace::fingerprints(&self.conn)
    }

    /// Upsert traces with their fingerprints in one transaction.
    pub fn upsert_traces(&self, traces: &[(octrace_types::AgentTrace, String)]) -> Result<usize> {
        let built_at = queries::now_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        for (agent_trace, fingerprint) in traces {
            trace::upsert(&tx, agent_trace, fingerprint, &built_at)?;
        }
        tx.commit()?;
        Ok(traces.len())
    }

    pub fn get_trace(&self, trace_id: &str) -> Result<Option<StoredTrace>> {
        trace::get(&self.conn, trace_id)
    }

    pub fn traces_for_session(&self, session_id: &str) -> Result<Vec<StoredTrace>> {
        trace::for_session(&self.conn, session_id)
    }

    pub fn traces_in_range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<StoredTrace>> {
        trace::in_range(&self.conn, from_ms, to_ms)
    }

    pub fn child_traces(&self, parent_trace_id: &str) -> Result<Vec<StoredTrace>> {
        trace::children(&self.conn, parent_trace_id)
    }

    pub fn root_traces(&self, limit: Option<usize>) -> Result<Vec<StoredTrace>> {
        trace::roots(&self.conn, limit)
    }

    pub fn list_traces(&self) -> Result<Vec<StoredTrace>> {
        trace::list_all(&self.conn)
    }

    // Sync state

    pub fn load_sync_state(&self) -> Result<Option<SyncState>> {
        sync_state::load(&self.conn)
    }

    pub fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        sync_state::save(&self.conn, state)
    }

    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute("VACUUM", [])?;
        tracing::info!("database vacuumed");
        Ok(())
    }
}
