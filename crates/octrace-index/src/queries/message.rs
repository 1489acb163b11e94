use octrace_types::MessageRecord;
use rusqlite::{Connection, Row, params};

use super::parse_column;
use crate::Result;

const SELECT_COLUMNS: &str = "id, session_id, role, agent, model_id, provider_id, created_at, \
     completed_at, tokens_in, tokens_out, tokens_reasoning, cache_read, cache_write, cost, error, \
     source_path";

fn from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: parse_column(row, 2)?,
        agent: row.get(3)?,
        model_id: row.get(4)?,
        provider_id: row.get(5)?,
        created_at: row.get(6)?,
        completed_at: row.get(7)?,
        tokens_in: row.get(8)?,
        tokens_out: row.get(9)?,
        tokens_reasoning: row.get(10)?,
        cache_read: row.get(11)?,
        cache_write: row.get(12)?,
        cost: row.get(13)?,
        error: row.get(14)?,
        source_path: row.get(15)?,
    })
}

/// Insert a message. A newer version of the same message only updates what is
/// known once it finishes: completion time, token counts, cost and error.
pub fn upsert(conn: &Connection, message: &MessageRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO messages (id, session_id, role, agent, model_id, provider_id, created_at,
                              completed_at, tokens_in, tokens_out, tokens_reasoning, cache_read,
                              cache_write, cost, error, source_path)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(id) DO UPDATE SET
            agent = COALESCE(messages.agent, excluded.agent),
            completed_at = COALESCE(excluded.completed_at, messages.completed_at),
            tokens_in = excluded.tokens_in,
            tokens_out = excluded.tokens_out,
            tokens_reasoning = excluded.tokens_reasoning,
            cache_read = excluded.cache_read,
            cache_write = excluded.cache_write,
            cost = excluded.cost,
            error = COALESCE(excluded.error, messages.error)
        "#,
    )?;

    stmt.execute(params![
        &message.id,
        &message.session_id,
        message.role.as_str(),
        &message.agent,
        &message.model_id,
        &message.provider_id,
        message.created_at,
        message.completed_at,
        message.tokens_in,
        message.tokens_out,
        message.tokens_reasoning,
        message.cache_read,
        message.cache_write,
        message.cost,
        &message.error,
        &message.source_path
    ])?;

    Ok(())
}

pub fn list_all(conn: &Connection) -> Result<Vec<MessageRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM messages ORDER BY session_id, created_at ASC, id ASC",
        SELECT_COLUMNS
    ))?;

    let messages = stmt
        .query_map([], from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(messages)
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> Result<Vec<MessageRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM messages WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
        SELECT_COLUMNS
    ))?;

    let messages = stmt
        .query_map([session_id], from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(messages)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
}
