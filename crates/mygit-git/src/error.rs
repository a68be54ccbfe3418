//! Git transfer error types.

use thiserror::Error;

/// Errors that can occur while decoding packs or talking to a remote.
#[derive(Debug, Error)]
pub enum GitError {
    /// Invalid pack file format.
    #[error("invalid pack file: {0}")]
    InvalidPack(String),

    /// Invalid delta instruction stream.
    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    /// Invalid pkt-line format.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// Unexpected response shape from the remote.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A pack feature this implementation doesn't handle.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Storage error.
    #[error(transparent)]
    Storage(#[from] mygit_storage::StorageError),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git transfer operations.
pub type Result<T> = std::result::Result<T, GitError>;
