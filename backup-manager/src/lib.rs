//! The Manager half of the backup coordinator: a durable agent registry, a
//! control server, and a periodic scheduler that pulls snapshots from every
//! registered agent on its configured cadence.

#![warn(missing_docs, clippy::pedantic)]

mod control_server;
mod error;
mod pull_client;
mod scheduler;

/// Errors surfaced across the control server and pull client.
pub use error::{ControlError, PullError};
/// The control server itself.
pub use control_server::ControlServer;
/// Outcome of a single pull, and the function that performs it.
pub use pull_client::{pull_agent, PullOutcome};
/// The periodic tick driver.
pub use scheduler::Scheduler;
