//! Append-only audit files kept alongside each registered backup agent:
//! `Historic` (lifecycle events) and `Log` (completed snapshots).

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod historic;
mod snapshot_log;

/// Error type and result alias for audit file operations.
pub use error::{AuditError, Result};
/// Lifecycle event log (`Historic`).
pub use historic::{HistoricEvent, HistoricLog};
/// Snapshot completion log (`Log`), plus the byte-size formatter it uses.
pub use snapshot_log::{format_size, SnapshotLog};
