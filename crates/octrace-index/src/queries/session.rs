use octrace_types::SessionRecord;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::Result;

const SELECT_COLUMNS: &str =
    "id, project_id, parent_id, title, directory, created_at, updated_at, source_path";

fn from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        parent_id: row.get(2)?,
        title: row.get(3)?,
        directory: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        source_path: row.get(7)?,
    })
}

/// Insert a session, or refresh the fields that change while it is alive.
pub fn upsert(conn: &Connection, session: &SessionRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"
        INSERT INTO sessions (id, project_id, parent_id, title, directory, created_at, updated_at, source_path)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            title = COALESCE(excluded.title, sessions.title),
            updated_at = COALESCE(excluded.updated_at, sessions.updated_at),
            parent_id = COALESCE(sessions.parent_id, excluded.parent_id)
        "#,
    )?;

    stmt.execute(params![
        &session.id,
        &session.project_id,
        &session.parent_id,
        &session.title,
        &session.directory,
        session.created_at,
        session.updated_at,
        &session.source_path
    ])?;

    Ok(())
}

pub fn get(conn: &Connection, session_id: &str) -> Result<Option<SessionRecord>> {
    let session = conn
        .query_row(
            &format!("SELECT {} FROM sessions WHERE id = ?1", SELECT_COLUMNS),
            [session_id],
            from_row,
        )
        .optional()?;

    Ok(session)
}

pub fn list_all(conn: &Connection) -> Result<Vec<SessionRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM sessions ORDER BY created_at ASC, id ASC",
        SELECT_COLUMNS
    ))?;

    let sessions = stmt
        .query_map([], from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(sessions)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?)
}
