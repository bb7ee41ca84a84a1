//! Registry entry describing a single backup agent.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::AgentId;

/// Maximum number of `Backup-*` snapshot files retained per agent.
pub const MAX_BACKUPS: usize = 10;

/// A registered backup agent: where it lives, what directory it serves, how
/// often it is due for a pull, and the UTC timestamp it is next due.
///
/// `next` is stored as RFC 3339 text rather than a `chrono` type directly so
/// the registry's on-disk document stays a plain, human-readable key/value
/// file (see [`crate`] and `backup-kernel::registry`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Host the agent listens on.
    pub ip: String,
    /// Port the agent's pull server listens on.
    pub port: String,
    /// Absolute directory path the agent serves for backup.
    pub path: String,
    /// Cadence between pulls, as a `humantime`-parseable string (`"30s"`, `"2h"`).
    pub freq: String,
    /// RFC 3339 timestamp this agent is next due for a pull.
    pub next: String,
}

impl AgentRecord {
    /// Builds a record, rejecting empty `ip`/`port`/`path` fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyField`] if any of `ip`, `port`, or `path` is empty.
    pub fn new(
        ip: impl Into<String>,
        port: impl Into<String>,
        path: impl Into<String>,
        freq: impl Into<String>,
        next: impl Into<String>,
    ) -> Result<Self> {
        let ip = ip.into();
        let port = port.into();
        let path = path.into();
        if ip.is_empty() {
            return Err(Error::EmptyField { field: "ip" });
        }
        if port.is_empty() {
            return Err(Error::EmptyField { field: "port" });
        }
        if path.is_empty() {
            return Err(Error::EmptyField { field: "path" });
        }
        Ok(Self {
            ip,
            port,
            path,
            freq: freq.into(),
            next: next.into(),
        })
    }

    /// Derives this record's identity, a fingerprint of `(ip, port, path)`.
    #[must_use]
    pub fn id(&self) -> AgentId {
        AgentId::derive(&self.ip, &self.port, &self.path)
    }

    /// Parses [`Self::freq`] as a duration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrequency`] if `freq` is not a valid
    /// `humantime` duration string.
    pub fn parsed_freq(&self) -> Result<Duration> {
        humantime::parse_duration(&self.freq).map_err(|source| Error::InvalidFrequency {
            raw: self.freq.clone(),
            source,
        })
    }
}
