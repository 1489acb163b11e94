// SQLite analytical store
// Ledger + raw tables written by ingestion, derived trace table written by the trace job

mod batch;
mod db;
mod error;
mod queries;
mod records;
mod schema;

// Public API
pub use batch::{BatchCounts, IngestBatch};
pub use db::Database;
pub use error::{Error, Result};
pub use records::{LedgerSummary, RecordCounts, StoredTrace, TraceInputs};
pub use schema::SCHEMA_VERSION;
