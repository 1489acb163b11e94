use octrace_types::SyncState;
use rusqlite::{Connection, OptionalExtension, params};

use super::{now_rfc3339, parse_column};
use crate::Result;

pub fn load(conn: &Connection) -> Result<Option<SyncState>> {
    let state = conn
        .query_row(
            r#"
            SELECT phase, cutover_time, total_files_at_cutover, files_marked
            FROM sync_state
            WHERE id = 1
            "#,
            [],
            |row| {
                Ok(SyncState {
                    phase: parse_column(row, 0)?,
                    cutover_time: row.get(1)?,
                    total_files_at_cutover: row.get(2)?,
                    files_marked: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(state)
}

pub fn save(conn: &Connection, state: &SyncState) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO sync_state (id, phase, cutover_time, total_files_at_cutover, files_marked, updated_at)
        VALUES (1, ?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
            phase = excluded.phase,
            cutover_time = excluded.cutover_time,
            total_files_at_cutover = excluded.total_files_at_cutover,
            files_marked = excluded.files_marked,
            updated_at = excluded.updated_at
        "#,
        params![
            state.phase.as_str(),
            state.cutover_time,
            state.total_files_at_cutover,
            state.files_marked,
            now_rfc3339()
        ],
    )?;

    Ok(())
}
