//! Shared error definitions for backup primitives.

use thiserror::Error;

/// Result alias used throughout the coordinator crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating backup primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// An `(ip, port, path)` component required to derive an `agent_id` was empty.
    #[error("agent record field `{field}` must not be empty")]
    EmptyField {
        /// The offending field name.
        field: &'static str,
    },

    /// The `freq` string did not parse as a duration.
    #[error("invalid frequency `{raw}`: {source}")]
    InvalidFrequency {
        /// The raw string that failed to parse.
        raw: String,
        /// Underlying parse error from `humantime`.
        #[source]
        source: humantime::DurationError,
    },
}
