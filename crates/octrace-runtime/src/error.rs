/// Result type for octrace-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Store error. The only kind the run loop treats as fatal.
    #[error("Index error: {0}")]
    Index(#[from] octrace_index::Error),

    /// Storage tree could not be listed
    #[error("Source error: {0}")]
    Source(#[from] octrace_source::Error),

    /// Filesystem notification backend failed
    #[error("Watch error: {0}")]
    Notify(#[from] notify::Error),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid operation or state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A thread panicked while holding a shared lock
    #[error("Lock poisoned: {0}")]
    Poisoned(&'static str),

    /// Work was interrupted by `stop()`
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Storage failures end the run; everything else is per-file or per-call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Index(_) | Error::Poisoned(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

