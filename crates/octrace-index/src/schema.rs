use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 3;

// NOTE: Store layout
//
// - indexed_files is the ledger: one row per source path, updated in place
//   as the path's mtime advances. Nothing writes raw rows without it.
// - sessions / messages / parts are keyed by the source tool's own ids, so
//   re-ingesting a newer file version upserts the same row.
// - agent_traces is derived and rebuildable; fingerprint lets the trace job
//   skip rows whose inputs did not change.
// - sync_state holds one row (id = 1) so the ingestion phase survives restarts.
//
// On a version mismatch everything is dropped: the ledger goes with the raw
// tables, so the next bulk pass rebuilds both consistently.

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_files (
            file_path TEXT PRIMARY KEY,
            file_type TEXT NOT NULL,
            last_modified REAL NOT NULL,
            processed_at TEXT NOT NULL,
            checksum TEXT,
            status TEXT NOT NULL,
            error TEXT
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            project_id TEXT,
            parent_id TEXT,
            title TEXT,
            directory TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER,
            source_path TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            agent TEXT,
            model_id TEXT,
            provider_id TEXT,
            created_at INTEGER NOT NULL,
            completed_at INTEGER,
            tokens_in INTEGER NOT NULL DEFAULT 0,
            tokens_out INTEGER NOT NULL DEFAULT 0,
            tokens_reasoning INTEGER NOT NULL DEFAULT 0,
            cache_read INTEGER NOT NULL DEFAULT 0,
            cache_write INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0,
            error TEXT,
            source_path TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS parts (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            message_id TEXT NOT NULL,
            part_type TEXT NOT NULL,
            text TEXT,
            tool_name TEXT,
            call_id TEXT,
            tool_status TEXT,
            tool_input TEXT,
            tool_output TEXT,
            tool_error TEXT,
            target_session_id TEXT,
            started_at INTEGER,
            ended_at INTEGER,
            source_path TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS agent_traces (
            trace_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            parent_trace_id TEXT,
            parent_agent TEXT,
            subagent_type TEXT,
            prompt_input TEXT,
            prompt_output TEXT,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            duration_ms INTEGER,
            tokens_in INTEGER NOT NULL DEFAULT 0,
            tokens_out INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            tools_used TEXT NOT NULL DEFAULT '[]',
            fingerprint TEXT NOT NULL,
            built_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            phase TEXT NOT NULL,
            cutover_time REAL NOT NULL,
            total_files_at_cutover INTEGER NOT NULL DEFAULT 0,
            files_marked INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_files_status ON indexed_files(status);
        CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);
        CREATE INDEX IF NOT EXISTS idx_parts_message ON parts(message_id);
        CREATE INDEX IF NOT EXISTS idx_parts_tool ON parts(tool_name);
        CREATE INDEX IF NOT EXISTS idx_traces_session ON agent_traces(session_id);
        CREATE INDEX IF NOT EXISTS idx_traces_parent ON agent_traces(parent_trace_id);
        CREATE INDEX IF NOT EXISTS idx_traces_started ON agent_traces(started_at DESC);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i32> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS agent_traces;
        DROP TABLE IF EXISTS parts;
        DROP TABLE IF EXISTS messages;
        DROP TABLE IF EXISTS sessions;
        DROP TABLE IF EXISTS indexed_files;
        DROP TABLE IF EXISTS sync_state;
        "#,
    )?;
    Ok(())
}
