//! Append-only `Historic` lifecycle log for a single agent.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AuditError, Result};

/// A lifecycle event recorded to an agent's `Historic` file.
#[derive(Debug, Clone)]
pub enum HistoricEvent {
    /// The agent was registered.
    Registered,
    /// The agent was unregistered.
    Unregistered,
    /// A new snapshot archive was saved.
    BackupSaved {
        /// Name of the archive file written.
        file_name: String,
        /// Size of the archive in bytes.
        bytes: u64,
    },
    /// A snapshot archive was evicted to respect the retention cap.
    BackupEvicted {
        /// Name of the evicted archive file.
        file_name: String,
    },
}

impl HistoricEvent {
    fn message(&self) -> String {
        match self {
            Self::Registered => "Backup client registered".to_owned(),
            Self::Unregistered => "Backup client unregistered".to_owned(),
            Self::BackupSaved { file_name, bytes } => {
                format!("Backup saved: {file_name} ({bytes} bytes)")
            }
            Self::BackupEvicted { file_name } => format!("Backup evicted: {file_name}"),
        }
    }
}

/// File-backed append-only historic/audit log, one line per lifecycle event.
pub struct HistoricLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl HistoricLog {
    /// Opens (or creates) the `Historic` file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the parent directory or file cannot be
    /// created/opened.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AuditError::io(&path, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AuditError::io(&path, e))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Appends a single event, terminated with a newline.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] on write failure.
    pub async fn append(&self, event: HistoricEvent) -> Result<()> {
        let line = format!("{} {}\n", Utc::now().to_rfc3339(), event.message());
        let mut guard = self.file.lock().await;
        guard
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AuditError::io(&self.path, e))?;
        guard.flush().await.map_err(|e| AuditError::io(&self.path, e))?;
        Ok(())
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
