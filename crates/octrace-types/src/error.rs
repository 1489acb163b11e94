/// Result type for octrace-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the types layer
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A stored string did not name a known variant of a closed enum
    #[error("Unknown {kind}: '{value}'")]
    UnknownVariant { kind: &'static str, value: String },
}

impl Error {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Error::UnknownVariant {
            kind,
            value: value.to_string(),
        }
    }
}
