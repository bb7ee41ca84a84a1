//! Errors produced by the snapshot engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors surfaced while producing or digesting a snapshot archive.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The requested directory does not exist on disk.
    #[error("directory does not exist: {0}")]
    NotFound(PathBuf),

    /// The requested path exists but is not a directory.
    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while walking, archiving, or reading back the archive.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}
