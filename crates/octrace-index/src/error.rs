/// Result type for octrace-index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the index layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database operation failed
    #[error("{}", describe_database_error(.0))]
    Database(#[from] rusqlite::Error),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored JSON column could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Read-only handle opened on a database written by another schema version
    #[error("Schema version mismatch: database has {found}, expected {expected}")]
    SchemaMismatch { found: i32, expected: i32 },
}

fn describe_database_error(err: &rusqlite::Error) -> String {
    let msg = err.to_string();
    // Detect schema mismatch errors and provide actionable hint
    if msg.contains("no such column") || msg.contains("no such table") {
        format!(
            "Database schema mismatch: {}. Reopen the store with a writer to auto-migrate.",
            msg
        )
    } else {
        format!("Database error: {}", err)
    }
}
