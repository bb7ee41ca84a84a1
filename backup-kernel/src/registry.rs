//! The Manager's durable, concurrency-safe `agent_id -> AgentRecord` map.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use backup_audit::{HistoricEvent, HistoricLog, SnapshotLog};
use backup_primitives::{AgentId, AgentRecord};
use chrono::Utc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

const INFORMATION_FILE: &str = "Information";

/// Result alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// `freq` failed to parse as a duration.
    #[error(transparent)]
    InvalidFrequency(#[from] backup_primitives::Error),
    /// No agent matches the given `(ip, port, path)` tuple.
    #[error("agent not registered")]
    NotRegistered,
    /// A filesystem operation on the registry or an agent directory failed.
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The on-disk `Information` document could not be parsed.
    #[error("corrupt registry document: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// Audit log append failed.
    #[error(transparent)]
    Audit(#[from] backup_audit::AuditError),
}

/// Outcome of [`Registry::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The agent was registered under this id.
    Added(AgentId),
    /// The `(ip, port, path)` tuple was already registered.
    AlreadyRegistered,
}

/// Outcome of [`Registry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The agent was removed.
    Removed,
    /// No agent matched the tuple.
    NotRegistered,
}

/// Durable, mutex-serialized registry of backup agents.
///
/// Every mutating operation reads the whole `Information` document, mutates
/// it in memory, and rewrites it in full under the same lock via
/// write-then-rename, so the document is never observed half-written. An
/// un-persisted mutation lost to a hard crash between memory update and
/// rename is accepted as a cost of keeping the format a plain JSON file.
pub struct Registry {
    storage_root: PathBuf,
    state: Mutex<HashMap<AgentId, AgentRecord>>,
}

impl Registry {
    /// Opens (or initializes) a registry rooted at `storage_root`, loading
    /// any existing `Information` document.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] or [`RegistryError::Corrupt`] if the
    /// existing document cannot be read or parsed.
    pub async fn open(storage_root: impl Into<PathBuf>) -> RegistryResult<Arc<Self>> {
        let storage_root = storage_root.into();
        fs::create_dir_all(&storage_root).await?;

        let document = load_document(&storage_root).await?;
        Ok(Arc::new(Self {
            storage_root,
            state: Mutex::new(document),
        }))
    }

    fn agent_dir(&self, id: AgentId) -> PathBuf {
        self.storage_root.join(id.as_str())
    }

    /// Returns a point-in-time copy of the full registry.
    pub async fn list(&self) -> HashMap<AgentId, AgentRecord> {
        self.state.lock().await.clone()
    }

    /// Registers a new agent. Parses `freq`, derives the agent's id,
    /// rejects duplicates, persists the document, ensures the agent's
    /// on-disk directory and empty audit files exist, and appends the
    /// registration event to `Historic`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidFrequency`] if `record.freq` does not
    /// parse, or an I/O/audit error if persistence fails.
    pub async fn add(&self, record: AgentRecord) -> RegistryResult<AddOutcome> {
        let freq = record.parsed_freq()?;
        let id = record.id();

        let mut guard = self.state.lock().await;
        if guard.contains_key(&id) {
            return Ok(AddOutcome::AlreadyRegistered);
        }

        let next = Utc::now() + freq;
        let mut record = record;
        record.next = next.to_rfc3339();

        guard.insert(id, record);
        self.persist(&guard).await?;
        drop(guard);

        self.ensure_agent_dir(id).await?;
        let historic = HistoricLog::open(self.agent_dir(id).join("Historic")).await?;
        historic.append(HistoricEvent::Registered).await?;
        info!(agent_id = %id, "agent registered");

        Ok(AddOutcome::Added(id))
    }

    /// Removes the agent identified by `(ip, port, path)`, appending a final
    /// `Historic` event before the registry entry is dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O/audit error if persistence fails.
    pub async fn remove(&self, ip: &str, port: &str, path: &str) -> RegistryResult<RemoveOutcome> {
        let id = AgentId::derive(ip, port, path);

        let mut guard = self.state.lock().await;
        if guard.remove(&id).is_none() {
            return Ok(RemoveOutcome::NotRegistered);
        }
        self.persist(&guard).await?;
        drop(guard);

        let historic = HistoricLog::open(self.agent_dir(id).join("Historic")).await?;
        historic.append(HistoricEvent::Unregistered).await?;
        info!(agent_id = %id, "agent unregistered");

        Ok(RemoveOutcome::Removed)
    }

    /// Commits the scheduler's `next` advances. An id that was concurrently
    /// removed is silently skipped -- an `UNREGISTER` racing a tick wins.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the updated document cannot be persisted.
    pub async fn apply_updates(&self, updates: HashMap<AgentId, AgentRecord>) -> RegistryResult<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut guard = self.state.lock().await;
        for (id, record) in updates {
            if guard.contains_key(&id) {
                guard.insert(id, record);
            } else {
                warn!(agent_id = %id, "skipping next-update for agent removed mid-tick");
            }
        }
        self.persist(&guard).await
    }

    /// Opens the `Log` file for the agent matching `(ip, port, path)`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotRegistered`] if no such agent exists.
    pub async fn open_log(&self, ip: &str, port: &str, path: &str) -> RegistryResult<SnapshotLog> {
        let id = AgentId::derive(ip, port, path);
        if !self.state.lock().await.contains_key(&id) {
            return Err(RegistryError::NotRegistered);
        }
        Ok(SnapshotLog::open(self.agent_dir(id).join("Log")).await?)
    }

    /// Returns the on-disk directory for an agent, creating it (and its
    /// empty `Historic`/`Log` files) if it is missing. An agent present in
    /// the registry but absent from disk (e.g. after manual cleanup) is
    /// silently re-created rather than treated as an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or audit files cannot be created.
    pub async fn ensure_agent_dir(&self, id: AgentId) -> RegistryResult<PathBuf> {
        let dir = self.agent_dir(id);
        fs::create_dir_all(&dir).await?;
        HistoricLog::open(dir.join("Historic")).await?;
        SnapshotLog::open(dir.join("Log")).await?;
        Ok(dir)
    }

    async fn persist(&self, state: &HashMap<AgentId, AgentRecord>) -> RegistryResult<()> {
        let document: HashMap<&str, &AgentRecord> =
            state.iter().map(|(id, record)| (id.as_str(), record)).collect();
        let body = serde_json::to_vec_pretty(&document)?;

        let final_path = self.storage_root.join(INFORMATION_FILE);
        let tmp_path = self.storage_root.join(format!("{INFORMATION_FILE}.tmp"));
        fs::write(&tmp_path, &body).await?;
        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }
}

async fn load_document(storage_root: &Path) -> RegistryResult<HashMap<AgentId, AgentRecord>> {
    let path = storage_root.join(INFORMATION_FILE);
    let raw = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(err) => return Err(err.into()),
    };
    if raw.is_empty() {
        return Ok(HashMap::new());
    }

    let document: HashMap<String, AgentRecord> = serde_json::from_slice(&raw)?;
    let mut state = HashMap::with_capacity(document.len());
    for record in document.into_values() {
        state.insert(record.id(), record);
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ip: &str, port: &str, path: &str, freq: &str) -> AgentRecord {
        AgentRecord::new(ip, port, path, freq, "").unwrap()
    }

    #[tokio::test]
    async fn add_then_list_contains_record_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();

        let outcome = registry.add(record("10.0.0.2", "9000", "/data", "30s")).await.unwrap();
        let AddOutcome::Added(id) = outcome else {
            panic!("expected Added");
        };

        let list = registry.list().await;
        assert!(list.contains_key(&id));
        assert!(registry.agent_dir(id).exists());
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();

        registry.add(record("10.0.0.2", "9000", "/data", "30s")).await.unwrap();
        let second = registry.add(record("10.0.0.2", "9000", "/data", "1h")).await.unwrap();
        assert_eq!(second, AddOutcome::AlreadyRegistered);
    }

    #[tokio::test]
    async fn invalid_frequency_is_rejected_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();

        let err = registry
            .add(record("10.0.0.2", "9000", "/data", "forever"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidFrequency(_)));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn add_then_remove_restores_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();

        registry.add(record("10.0.0.2", "9000", "/data", "30s")).await.unwrap();
        let outcome = registry.remove("10.0.0.2", "9000", "/data").await.unwrap();
        assert_eq!(outcome, RemoveOutcome::Removed);
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn remove_unknown_agent_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();
        let outcome = registry.remove("10.0.0.2", "9000", "/data").await.unwrap();
        assert_eq!(outcome, RemoveOutcome::NotRegistered);
    }

    #[tokio::test]
    async fn apply_updates_skips_concurrently_removed_agent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();

        let AddOutcome::Added(id) = registry.add(record("10.0.0.2", "9000", "/data", "30s")).await.unwrap()
        else {
            panic!("expected Added");
        };

        registry.remove("10.0.0.2", "9000", "/data").await.unwrap();

        let mut updates = HashMap::new();
        updates.insert(id, record("10.0.0.2", "9000", "/data", "30s"));
        registry.apply_updates(updates).await.unwrap();

        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn registry_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let registry = Registry::open(dir.path()).await.unwrap();
            registry.add(record("10.0.0.2", "9000", "/data", "30s")).await.unwrap();
        }

        let reopened = Registry::open(dir.path()).await.unwrap();
        let list = reopened.list().await;
        assert_eq!(list.len(), 1);
        let record = list.values().next().unwrap();
        assert_eq!(record.ip, "10.0.0.2");
    }
}
