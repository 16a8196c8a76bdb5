//! Error types for state persistence

/// Errors from state backend operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("state serialize error: {0}")]
    Serialize(String),
}

/// Result alias for state backend operations.
pub type Result<T> = std::result::Result<T, Error>;
