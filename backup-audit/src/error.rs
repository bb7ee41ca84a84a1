//! Error type for audit file operations.

use thiserror::Error;

/// Result alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors surfaced while appending to or reading an agent's audit files.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The underlying file operation failed.
    #[error("audit I/O error on {path}: {source}")]
    Io {
        /// Path the operation was attempted against.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    pub(crate) fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
