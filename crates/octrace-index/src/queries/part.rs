use octrace_types::PartRecord;
use rusqlite::{Connection, Row, params};

use super::{parse_column, parse_optional_column};
use crate::Result;

const SELECT_COLUMNS: &str = "id, session_id, message_id, part_type, text, tool_name, call_id, \
     tool_status, tool_input, tool_output, tool_error, target_session_id, started_at, ended_at, \
     source_path";

fn from_row(row: &Row<'_>) -> rusqlite::Result<PartRecord> {
    Ok(PartRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        message_id: row.get(2)?,
        part_type: parse_column(row, 3)?,
        text: row.get(4)?,
        tool_name: row.get(5)?,
        call_id: row.get(6)?,
        tool_status: parse_optional_column(row, 7)?,
        tool_input: row.get(8)?,
        tool_output: row.get(9)?,
        tool_error: row.get(10)?,
        target_session_id: row.get(11)?,
        started_at: row.get(12)?,
        ended_at: row.get(13)?,
        source_path: row.get(14)?,
    })
}

/// Insert a part. Later versions update streaming text and tool progress.
pub fn upsert(conn: &Connection, part: &PartRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO parts (id, session_id, message_id, part_type, text, tool_name, call_id,
                           tool_status, tool_input, tool_output, tool_error, target_session_id,
                           started_at, ended_at, source_path)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        ON CONFLICT(id) DO UPDATE SET
            text = COALESCE(excluded.text, parts.text),
            tool_status = COALESCE(excluded.tool_status, parts.tool_status),
            tool_input = COALESCE(excluded.tool_input, parts.tool_input),
            tool_output = COALESCE(excluded.tool_output, parts.tool_output),
            tool_error = COALESCE(excluded.tool_error, parts.tool_error),
            target_session_id = COALESCE(excluded.target_session_id, parts.target_session_id),
            started_at = COALESCE(parts.started_at, excluded.started_at),
            ended_at = COALESCE(excluded.ended_at, parts.ended_at)
        "#,
    )?;

    stmt.execute(params![
        &part.id,
        &part.session_id,
        &part.message_id,
        part.part_type.as_str(),
        &part.text,
        &part.tool_name,
        &part.call_id,
        part.tool_status.map(|s| s.as_str()),
        &part.tool_input,
        &part.tool_output,
        &part.tool_error,
        &part.target_session_id,
        part.started_at,
        part.ended_at,
        &part.source_path
    ])?;

    Ok(())
}

/// Tool and text parts, the only kinds trace building looks at.
pub fn list_trace_relevant(conn: &Connection) -> Result<Vec<PartRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM parts WHERE part_type IN ('tool', 'text') ORDER BY message_id, id",
        SELECT_COLUMNS
    ))?;

    let parts = stmt
        .query_map([], from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(parts)
}

pub fn list_for_message(conn: &Connection, message_id: &str) -> Result<Vec<PartRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM parts WHERE message_id = ?1 ORDER BY id",
        SELECT_COLUMNS
    ))?;

    let parts = stmt
        .query_map([message_id], from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(parts)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM parts", [], |row| row.get(0))?)
}
