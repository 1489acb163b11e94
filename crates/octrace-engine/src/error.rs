/// Result type for octrace-engine operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown tie-break policy name
    #[error("Unknown parent tie-break policy: {0} (expected most_recent or earliest)")]
    UnknownTieBreak(String),
}
