//! Core shared types for the backup coordinator: agent identity, the
//! registry record shape, and the errors both sides of the protocol use.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod ids;
mod record;

/// Error type and result alias shared across the coordinator crates.
pub use error::{Error, Result};
/// Fingerprint identifying an agent by `(ip, port, path)`.
pub use ids::AgentId;
/// Registry entry and duration parsing for an agent's backup cadence.
pub use record::{AgentRecord, MAX_BACKUPS};
