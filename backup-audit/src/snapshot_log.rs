//! Append-only `Log` file: one line per completed snapshot.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AuditError, Result};

/// File-backed append-only snapshot log.
pub struct SnapshotLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl SnapshotLog {
    /// Opens (or creates) the `Log` file at `path`.
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

    /// Appends one line recording a completed snapshot's name and size.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] on write failure.
    pub async fn append(&self, file_name: &str, bytes: u64) -> Result<()> {
        let line = format!(
            "{} {} {}\n",
            Utc::now().to_rfc3339(),
            file_name,
            format_size(bytes)
        );
        let mut guard = self.file.lock().await;
        guard
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AuditError::io(&self.path, e))?;
        guard.flush().await.map_err(|e| AuditError::io(&self.path, e))?;
        Ok(())
    }

    /// Reads the whole log back, used to serve the `QUERY` control verb.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be read.
    pub async fn read_all(&self) -> Result<Vec<u8>> {
        fs::read(&self.path)
            .await
            .map_err(|e| AuditError::io(&self.path, e))
    }

    /// Returns the path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Renders a byte count in a unit-scaled human-readable form (`B`, `kB`, `MB`, ...).
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let bytes_f = bytes as f64;
    if bytes_f >= GB {
        format!("{:.2}GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2}MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2}kB", bytes_f / KB)
    } else {
        format!("{bytes}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_picks_largest_fitting_unit() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2.00kB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00MB");
    }

    #[tokio::test]
    async fn append_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Log");
        let log = SnapshotLog::open(&path).await.unwrap();

        log.append("Backup-20260101000000.tar.gz", 2048).await.unwrap();
        log.append("Backup-20260101000010.tar.gz", 4096).await.unwrap();

        let content = log.read_all().await.unwrap();
        let text = String::from_utf8(content).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("2.00kB"));
        assert!(lines[1].contains("4.00kB"));
    }
}
