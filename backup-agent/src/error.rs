//! Errors surfaced by the pull server.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for pull-server operations.
pub type Result<T> = std::result::Result<T, PullError>;

/// Errors raised while serving a single pull connection.
#[derive(Debug, Error)]
pub enum PullError {
    /// A frame read/write did not complete within [`backup_kernel::PULL_TIMEOUT`].
    #[error("pull connection timed out")]
    Timeout,
    /// The peer closed the connection before a full frame was read.
    #[error("pull connection closed mid-frame")]
    ConnectionClosed,
    /// A size frame could not be decoded.
    #[error(transparent)]
    Frame(#[from] backup_kernel::FrameError),
    /// Snapshotting the requested path failed.
    #[error(transparent)]
    Snapshot(#[from] backup_snapshot::SnapshotError),
    /// A socket or scratch-file operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path involved, if any; `<socket>` for network-only failures.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl PullError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
