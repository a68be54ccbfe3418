//! Storage error types.

use thiserror::Error;

/// Errors that can occur while reading or writing objects.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A partial hash shorter than two hex characters.
    #[error("provided hash isn't long enough")]
    TooShort,

    /// No loose object matches the given prefix.
    #[error("not a valid object name {0}")]
    NotFound(String),

    /// More than one loose object matches the given prefix.
    #[error("provided hash {0} isn't unique enough")]
    Ambiguous(String),

    /// An object fails an integrity check (bad framing, length mismatch).
    #[error("corrupt object: {0}")]
    Corrupt(String),

    /// An object kind or tree entry this implementation doesn't handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
