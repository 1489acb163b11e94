use octrace_types::{FileStatus, IndexedFile};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{now_rfc3339, parse_column};
use crate::{Result, records::LedgerSummary};

const SELECT_COLUMNS: &str =
    "file_path, file_type, last_modified, processed_at, checksum, status, error";

// The WHERE clause keeps the ledger monotonic: an older mtime never
// overwrites a newer one, and a processed entry is never downgraded at the
// same mtime.
const UPSERT: &str = r#"
    INSERT INTO indexed_files (file_path, file_type, last_modified, processed_at, checksum, status, error)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(file_path) DO UPDATE SET
        file_type = excluded.file_type,
        last_modified = excluded.last_modified,
        processed_at = excluded.processed_at,
        checksum = COALESCE(excluded.checksum, indexed_files.checksum),
        status = excluded.status,
        error = excluded.error
    WHERE excluded.last_modified > indexed_files.last_modified
       OR (excluded.last_modified = indexed_files.last_modified
           AND (indexed_files.status != 'processed' OR excluded.status = 'processed'))
"#;

fn from_row(row: &Row<'_>) -> rusqlite::Result<IndexedFile> {
    Ok(IndexedFile {
        file_path: row.get(0)?,
        file_type: parse_column(row, 1)?,
        last_modified: row.get(2)?,
        processed_at: row.get(3)?,
        checksum: row.get(4)?,
        status: parse_column(row, 5)?,
        error: row.get(6)?,
    })
}

pub fn get(conn: &Connection, file_path: &str) -> Result<Option<IndexedFile>> {
    let entry = conn
        .query_row(
            &format!(
                "SELECT {} FROM indexed_files WHERE file_path = ?1",
                SELECT_COLUMNS
            ),
            [file_path],
            from_row,
        )
        .optional()?;

    Ok(entry)
}

pub fn is_current(conn: &Connection, file_path: &str, mtime: f64) -> Result<bool> {
    let current = conn
        .query_row(
            r#"
            SELECT 1 FROM indexed_files
            WHERE file_path = ?1 AND status = 'processed' AND last_modified >= ?2
            "#,
            params![file_path, mtime],
            |_| Ok(()),
        )
        .optional()?;

    Ok(current.is_some())
}

/// Upsert one entry. Returns false if a newer entry already exists.
pub fn mark(conn: &Connection, entry: &IndexedFile) -> Result<bool> {
    let processed_at = stamp(entry);
    let changed = conn.execute(
        UPSERT,
        params![
            &entry.file_path,
            entry.file_type.as_str(),
            entry.last_modified,
            processed_at,
            &entry.checksum,
            entry.status.as_str(),
            &entry.error
        ],
    )?;

    Ok(changed > 0)
}

/// Upsert many entries with one prepared statement. Callers wrap this in a
/// transaction. Returns the number of rows written.
pub fn mark_batch(conn: &Connection, entries: &[IndexedFile]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(UPSERT)?;
    let now = now_rfc3339();
    let mut written = 0;

    for entry in entries {
        let processed_at = if entry.processed_at.is_empty() {
            now.as_str()
        } else {
            entry.processed_at.as_str()
        };
        written += stmt.execute(params![
            &entry.file_path,
            entry.file_type.as_str(),
            entry.last_modified,
            processed_at,
            &entry.checksum,
            entry.status.as_str(),
            &entry.error
        ])?;
    }

    Ok(written)
}

/// Set-oriented staleness check.
///
/// Loads the whole listing into a temp table and returns, in one query, the
/// paths that have no ledger entry, whose mtime advanced past the recorded one,
/// or whose entry is still pending. Failed and skipped entries at an unchanged
/// mtime are not returned.
pub fn stale_paths(conn: &Connection, listing: &[(String, f64)]) -> Result<Vec<String>> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        r#"
        CREATE TEMP TABLE IF NOT EXISTS scan_listing (
            path TEXT PRIMARY KEY,
            mtime REAL NOT NULL
        );
        DELETE FROM scan_listing;
        "#,
    )?;

    {
        let mut insert =
            tx.prepare_cached("INSERT OR REPLACE INTO scan_listing (path, mtime) VALUES (?1, ?2)")?;
        for (path, mtime) in listing {
            insert.execute(params![path, mtime])?;
        }
    }

    let stale = {
        let mut stmt = tx.prepare(
            r#"
            SELECT s.path
            FROM scan_listing s
            LEFT JOIN indexed_files f ON f.file_path = s.path
            WHERE f.file_path IS NULL
               OR s.mtime > f.last_modified
               OR f.status = 'pending'
            ORDER BY s.path
            "#,
        )?;
        stmt.query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?
    };

    tx.execute("DELETE FROM scan_listing", [])?;
    tx.commit()?;

    Ok(stale)
}

pub fn list_by_status(
    conn: &Connection,
    status: FileStatus,
    limit: Option<usize>,
) -> Result<Vec<IndexedFile>> {
    let limit_clause = limit.map(|l| format!("LIMIT {}", l)).unwrap_or_default();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM indexed_files WHERE status = ?1 ORDER BY processed_at DESC, file_path {}",
        SELECT_COLUMNS, limit_clause
    ))?;

    let entries = stmt
        .query_map([status.as_str()], from_row)?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(entries)
}

pub fn summary(conn: &Connection) -> Result<LedgerSummary> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM indexed_files GROUP BY status")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((parse_column::<FileStatus>(row, 0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    let mut summary = LedgerSummary::default();
    for (status, count) in rows {
        match status {
            FileStatus::Pending => summary.pending = count,
            FileStatus::Processed => summary.processed = count,
            FileStatus::Failed => summary.failed = count,
            FileStatus::Skipped => summary.skipped = count,
        }
    }

    Ok(summary)
}

fn stamp(entry: &IndexedFile) -> String {
    if entry.processed_at.is_empty() {
        now_rfc3339()
    } else {
        entry.processed_at.clone()
    }
}
