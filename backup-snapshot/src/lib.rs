//! Snapshot engine: recursive tar+gzip archive production and the
//! content-digest ETag algorithm shared by the Manager and the Agent.

#![warn(missing_docs, clippy::pedantic)]

mod engine;
mod error;
mod etag;

/// Archive production.
pub use engine::create_archive;
/// Error type and result alias for snapshot operations.
pub use error::{Result, SnapshotError};
/// ETag computation and its fixed output width.
pub use etag::{compute_archive_etag, ETAG_LEN};
