//! Errors surfaced by the control server and the pull client.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while answering a control-wire connection.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A required argument was missing for the given verb.
    #[error("missing required field `{field}` for {verb}")]
    MissingField {
        /// The verb being validated.
        verb: &'static str,
        /// The field that was missing.
        field: &'static str,
    },
    /// No verb was present, or it did not match a known variant.
    #[error("unknown or missing verb")]
    UnknownVerb,
}

/// Errors raised while pulling a snapshot from a single agent.
#[derive(Debug, Error)]
pub enum PullError {
    /// The agent could not be reached.
    #[error("could not connect to agent at {addr}: {source}")]
    Connect {
        /// The address that was dialed.
        addr: String,
        /// Underlying connection error.
        #[source]
        source: std::io::Error,
    },
    /// The pull protocol reported an error sentinel (the requested path is missing on the agent).
    #[error("agent reported the requested path is missing")]
    PathMissing,
    /// A frame could not be decoded.
    #[error(transparent)]
    Frame(#[from] backup_kernel::FrameError),
    /// A socket or local file operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path involved, if any; `<socket>` for network-only failures.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The pull connection timed out.
    #[error("pull connection timed out")]
    Timeout,
    /// Computing the ETag of a locally stored archive failed.
    #[error(transparent)]
    Snapshot(#[from] backup_snapshot::SnapshotError),
    /// Appending to an agent's audit files failed.
    #[error(transparent)]
    Audit(#[from] backup_audit::AuditError),
}

impl PullError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
