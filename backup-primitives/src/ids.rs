//! Agent identifier: a content fingerprint of `(ip, port, path)`.

use std::fmt::{self, Display, Formatter, Write as _};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters an [`AgentId`] is truncated to.
const FINGERPRINT_LEN: usize = 11;

/// Unique identifier for a registered backup agent, derived from
/// `(ip, port, path)` only -- `freq` never participates in identity.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AgentId([u8; FINGERPRINT_LEN]);

impl AgentId {
    /// Derives the fingerprint for an `(ip, port, path)` tuple.
    ///
    /// Hashes the byte string `"<ip>-<port>-<path>"` with SHA-256 and keeps
    /// the first [`FINGERPRINT_LEN`] hex characters of the lowercase digest.
    #[must_use]
    pub fn derive(ip: &str, port: &str, path: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ip.as_bytes());
        hasher.update(b"-");
        hasher.update(port.as_bytes());
        hasher.update(b"-");
        hasher.update(path.as_bytes());
        let digest = hasher.finalize();

        let mut hex = String::with_capacity(64);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }

        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(&hex.as_bytes()[..FINGERPRINT_LEN]);
        Self(bytes)
    }

    /// Returns the fingerprint as its hex string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).expect("fingerprint is ascii hex")
    }
}

impl Display for AgentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<AgentId> for String {
    fn from(value: AgentId) -> Self {
        value.as_str().to_owned()
    }
}

impl TryFrom<String> for AgentId {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() != FINGERPRINT_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(crate::Error::EmptyField {
                field: "agent_id",
            });
        }
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(value.as_bytes());
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let a = AgentId::derive("10.0.0.2", "9000", "/data");
        let b = AgentId::derive("10.0.0.2", "9000", "/data");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn differing_path_changes_identity() {
        let a = AgentId::derive("10.0.0.2", "9000", "/data");
        let b = AgentId::derive("10.0.0.2", "9000", "/other");
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_string() {
        let id = AgentId::derive("10.0.0.2", "9000", "/data");
        let text: String = id.into();
        let back = AgentId::try_from(text).unwrap();
        assert_eq!(id, back);
    }
}
