use octrace_types::AgentTrace;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{BTreeSet, HashMap};

use super::parse_column;
use crate::{Result, records::StoredTrace};

const SELECT_COLUMNS: &str = "trace_id, session_id, parent_trace_id, parent_agent, subagent_type, \
     prompt_input, prompt_output, started_at, ended_at, duration_ms, tokens_in, tokens_out, cost, \
     status, tools_used, fingerprint, built_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<StoredTrace> {
    let tools_json: String = row.get(14)?;
    let tools_used: BTreeSet<String> = serde_json::from_str(&tools_json).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(14, rusqlite::types::Type::Text, Box::new(err))
    })?;

    Ok(StoredTrace {
        trace: AgentTrace {
            trace_id: row.get(0)?,
            session_id: row.get(1)?,
            parent_trace_id: row.get(2)?,
            parent_agent: row.get(3)?,
            subagent_type: row.get(4)?,
            prompt_input: row.get(5)?,
            prompt_output: row.get(6)?,
            started_at: row.get(7)?,
            ended_at: row.get(8)?,
            duration_ms: row.get(9)?,
            tokens_in: row.get(10)?,
            tokens_out: row.get(11)?,
            cost: row.get(12)?,
            status: parse_column(row, 13)?,
            tools_used,
        },
        fingerprint: row.get(15)?,
        built_at: row.get(16)?,
    })
}

pub fn upsert(conn: &Connection, trace: &AgentTrace, fingerprint: &str, built_at: &str) -> Result<()> {
    let tools_used = serde_json::to_string(&trace.tools_used)?;
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO agent_traces (trace_id, session_id, parent_trace_id, parent_agent, subagent_type,
                                  prompt_input, prompt_output, started_at, ended_at, duration_ms,
                                  tokens_in, tokens_out, cost, status, tools_used, fingerprint, built_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
        ON CONFLICT(trace_id) DO UPDATE SET
            session_id = excluded.session_id,
            parent_trace_id = excluded.parent_trace_id,
            parent_agent = excluded.parent_agent,
            subagent_type = excluded.subagent_type,
            prompt_input = excluded.prompt_input,
            prompt_output = excluded.prompt_output,
            started_at = excluded.started_at,
            ended_at = excluded.ended_at,
            duration_ms = excluded.duration_ms,
            tokens_in = excluded.tokens_in,
            tokens_out = excluded.tokens_out,
            cost = excluded.cost,
            status = excluded.status,
            tools_used = excluded.tools_used,
            fingerprint = excluded.fingerprint,
            built_at = excluded.built_at
        "#,
    )?;

    stmt.execute(params![
        &trace.trace_id,
        &trace.session_id,
        &trace.parent_trace_id,
        &trace.parent_agent,
        &trace.subagent_type,
        &trace.prompt_input,
        &trace.prompt_output,
        trace.started_at,
        trace.ended_at,
        trace.duration_ms,
        trace.tokens_in,
        trace.tokens_out,
        trace.cost,
        trace.status.as_str(),
        tools_used,
        fingerprint,
        built_at
    ])?;

    Ok(())
}

/// trace_id -> fingerprint for every stored trace.
pub fn fingerprints(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT trace_id, fingerprint FROM agent_traces")?;
    let pairs = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<HashMap<_, _>, rusqlite::Error>>()?;

    Ok(pairs)
}

pub fn get(conn: &Connection, trace_id: &str) -> Result<Option<StoredTrace>> {
    let trace = conn
        .query_row(
            &format!(
                "SELECT {} FROM agent_traces WHERE trace_id = ?1",
                SELECT_COLUMNS
            ),
            [trace_id],
            from_row,
        )
        .optional()?;

    Ok(trace)
}

fn query(conn: &Connection, where_order: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<StoredTrace>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM agent_traces {}",
        SELECT_COLUMNS, where_order
    ))?;

    let traces = stmt
        .query_map(params, from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(traces)
}

pub fn for_session(conn: &Connection, session_id: &str) -> Result<Vec<StoredTrace>> {
    query(
        conn,
        "WHERE session_id = ?1 ORDER BY started_at ASC, trace_id ASC",
        &[&session_id],
    )
}

/// Traces whose start falls in `[from_ms, to_ms)`.
pub fn in_range(conn: &Connection, from_ms: i64, to_ms: i64) -> Result<Vec<StoredTrace>> {
    query(
        conn,
        "WHERE started_at >= ?1 AND started_at < ?2 ORDER BY started_at ASC, trace_id ASC",
        &[&from_ms, &to_ms],
    )
}

pub fn children(conn: &Connection, parent_trace_id: &str) -> Result<Vec<StoredTrace>> {
    query(
        conn,
        "WHERE parent_trace_id = ?1 ORDER BY started_at ASC, trace_id ASC",
        &[&parent_trace_id],
    )
}

pub fn roots(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredTrace>> {
    let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();
    query(
        conn,
        &format!(
            "WHERE parent_trace_id IS NULL ORDER BY started_at DESC, trace_id ASC {}",
            limit_clause
        ),
        &[],
    )
}

pub fn list_all(conn: &Connection) -> Result<Vec<StoredTrace>> {
    query(conn, "ORDER BY trace_id ASC", &[])
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM agent_traces", [], |row| row.get(0))?)
}
