//! Pull-protocol client: dials an agent, exchanges the fixed-width frames,
//! and persists whatever archive comes back under the agent's directory.

use std::path::{Path, PathBuf};

use backup_audit::{HistoricEvent, HistoricLog, SnapshotLog};
use backup_kernel::{
    decode_size, pad, BUFFER_BACKUP, ETAG_FRAME_LEN, PATH_FRAME_LEN, PULL_TIMEOUT, SIZE_ERROR,
    SIZE_UNCHANGED,
};
use backup_primitives::{AgentId, AgentRecord, MAX_BACKUPS};
use backup_snapshot::compute_archive_etag;
use chrono::Utc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::PullError;

type Result<T> = std::result::Result<T, PullError>;

/// What happened when an agent was pulled.
#[derive(Debug, PartialEq, Eq)]
pub enum PullOutcome {
    /// The archive was unchanged since the last stored snapshot; nothing was written.
    Unchanged,
    /// A new snapshot archive was written.
    Saved {
        /// The file name of the new archive, relative to the agent's directory.
        file_name: String,
        /// Its size in bytes.
        bytes: u64,
    },
    /// The agent reported that the requested path no longer exists.
    PathMissing,
}

/// Pulls one agent: computes the ETag of the last stored archive, performs
/// the pull protocol, and persists a new archive (plus audit lines) if the
/// content changed.
///
/// # Errors
///
/// Returns [`PullError`] if the agent cannot be reached, a frame
/// cannot be decoded, or a local file operation fails.
pub async fn pull_agent(id: AgentId, record: &AgentRecord, agent_dir: &Path) -> Result<PullOutcome> {
    let addr = format!("{}:{}", record.ip, record.port);
    let requested_etag = last_stored_etag(agent_dir).await?;

    let mut stream = timeout(PULL_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| PullError::Timeout)?
        .map_err(|source| PullError::Connect { addr: addr.clone(), source })?;

    write_timeout(&mut stream, &pad(&requested_etag, ETAG_FRAME_LEN)).await?;
    write_timeout(&mut stream, &pad(&record.path, PATH_FRAME_LEN)).await?;

    let mut size_frame = [0u8; 10];
    read_exact_timeout(&mut stream, &mut size_frame).await?;
    let size = decode_size(&size_frame)?;

    if size == SIZE_ERROR {
        warn!(agent_id = %id, path = %record.path, "agent reports requested path is missing");
        return Ok(PullOutcome::PathMissing);
    }
    if size == SIZE_UNCHANGED {
        info!(agent_id = %id, "archive unchanged since last pull");
        return Ok(PullOutcome::Unchanged);
    }

    let file_name = format!("Backup-{}.tar.gz", Utc::now().format("%Y%m%d%H%M%S"));
    let archive_path = agent_dir.join(&file_name);
    let save_result = receive_archive(&mut stream, &archive_path, size as u64).await;
    if let Err(err) = save_result {
        let _ = fs::remove_file(&archive_path).await;
        return Err(err);
    }

    let bytes = fs::metadata(&archive_path)
        .await
        .map_err(|e| PullError::io(&archive_path, e))?
        .len();

    record_snapshot(agent_dir, &file_name, bytes).await?;
    enforce_retention(agent_dir).await?;

    info!(agent_id = %id, file_name, bytes, "archive saved");
    Ok(PullOutcome::Saved { file_name, bytes })
}

async fn receive_archive(stream: &mut TcpStream, archive_path: &Path, size: u64) -> Result<()> {
    let mut file = fs::File::create(archive_path)
        .await
        .map_err(|e| PullError::io(archive_path, e))?;

    let mut remaining = size;
    let mut buf = [0u8; BUFFER_BACKUP];
    while remaining > 0 {
        let want = remaining.min(BUFFER_BACKUP as u64) as usize;
        let read = timeout(PULL_TIMEOUT, stream.read(&mut buf[..want]))
            .await
            .map_err(|_| PullError::Timeout)?
            .map_err(|e| PullError::io("<socket>", e))?;
        if read == 0 {
            return Err(PullError::io(
                archive_path,
                std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            ));
        }
        file.write_all(&buf[..read])
            .await
            .map_err(|e| PullError::io(archive_path, e))?;
        remaining -= read as u64;
    }
    file.flush().await.map_err(|e| PullError::io(archive_path, e))
}

async fn record_snapshot(agent_dir: &Path, file_name: &str, bytes: u64) -> Result<()> {
    let log = SnapshotLog::open(agent_dir.join("Log")).await?;
    log.append(file_name, bytes).await?;

    let historic = HistoricLog::open(agent_dir.join("Historic")).await?;
    historic
        .append(HistoricEvent::BackupSaved {
            file_name: file_name.to_owned(),
            bytes,
        })
        .await?;
    Ok(())
}

async fn enforce_retention(agent_dir: &Path) -> Result<()> {
    let mut names = list_backup_files(agent_dir).await?;
    if names.len() <= MAX_BACKUPS {
        return Ok(());
    }

    names.sort();
    let evict_count = names.len() - MAX_BACKUPS;
    let historic = HistoricLog::open(agent_dir.join("Historic")).await?;
    for name in names.into_iter().take(evict_count) {
        let path = agent_dir.join(&name);
        fs::remove_file(&path).await.map_err(|e| PullError::io(&path, e))?;
        historic
            .append(HistoricEvent::BackupEvicted { file_name: name.clone() })
            .await?;
        info!(file_name = %name, "evicted snapshot to respect retention cap");
    }
    Ok(())
}

async fn last_stored_etag(agent_dir: &Path) -> Result<String> {
    let names = list_backup_files(agent_dir).await?;
    let Some(latest) = names.into_iter().max() else {
        return Ok(String::new());
    };
    let path = agent_dir.join(latest);
    let etag = tokio::task::spawn_blocking(move || compute_archive_etag(&path))
        .await
        .expect("etag task panicked")?;
    Ok(etag)
}

async fn list_backup_files(agent_dir: &Path) -> Result<Vec<String>> {
    let mut entries = match fs::read_dir(agent_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(PullError::io(agent_dir, err)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PullError::io(agent_dir, e))?
    {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with("Backup-") && name.ends_with(".tar.gz") {
                names.push(name.to_owned());
            }
        }
    }
    Ok(names)
}

async fn write_timeout(stream: &mut TcpStream, buf: &[u8]) -> Result<()> {
    timeout(PULL_TIMEOUT, stream.write_all(buf))
        .await
        .map_err(|_| PullError::Timeout)?
        .map_err(|e| PullError::io("<socket>", e))
}

async fn read_exact_timeout(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    timeout(PULL_TIMEOUT, stream.read_exact(buf))
        .await
        .map_err(|_| PullError::Timeout)?
        .map_err(|e| PullError::io("<socket>", e))
        .map(|_| ())
}
