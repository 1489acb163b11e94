/// Result type for octrace-source operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading the storage tree
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Walkdir error
    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Storage root is missing or not a directory
    #[error("Storage root not found: {0}")]
    RootNotFound(String),
}
