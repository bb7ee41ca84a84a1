//! The Agent half of the backup coordinator: a pull server that snapshots a
//! configured directory on demand.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod server;

/// Error type and result alias for pull-server operations.
pub use error::{PullError, Result};
/// The pull server itself.
pub use server::PullServer;
