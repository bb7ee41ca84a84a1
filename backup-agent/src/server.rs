//! TCP pull server: answers the Manager's fixed-width pull-protocol frames.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use backup_kernel::{
    encode_size, unpad, TaskScheduler, BUFFER_BACKUP, ETAG_FRAME_LEN, PATH_FRAME_LEN,
    PULL_TIMEOUT, SIZE_ERROR, SIZE_UNCHANGED,
};
use backup_snapshot::{compute_archive_etag, create_archive};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::error::{PullError, Result};

/// Accepts pull connections and serves snapshot archives of a single
/// configured directory.
pub struct PullServer {
    listener: TcpListener,
    scratch_dir: PathBuf,
    next_request: AtomicU64,
}

impl PullServer {
    /// Binds the pull server to `addr`, creating `scratch_dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the scratch
    /// directory cannot be created.
    pub async fn bind(addr: std::net::SocketAddr, scratch_dir: PathBuf) -> std::io::Result<Self> {
        fs::create_dir_all(&scratch_dir).await?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            scratch_dir,
            next_request: AtomicU64::new(0),
        })
    }

    /// Returns the address the server is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying socket cannot report its address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `shutdown` resolves, dispatching each
    /// connection to `scheduler` so a burst of pulls cannot starve the
    /// runtime.
    pub async fn run(self: Arc<Self>, scheduler: TaskScheduler, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let server = Arc::clone(&self);
                            let request_id = server.next_request.fetch_add(1, Ordering::Relaxed);
                            scheduler.spawn(async move {
                                if let Err(err) = server.serve(stream, request_id).await {
                                    warn!(%peer, %err, "pull connection failed");
                                }
                            });
                        }
                        Err(err) => error!(%err, "failed to accept pull connection"),
                    }
                }
                () = &mut shutdown => {
                    info!("pull server shutting down");
                    return;
                }
            }
        }
    }

    async fn serve(&self, mut stream: TcpStream, request_id: u64) -> Result<()> {
        let mut etag_frame = [0u8; ETAG_FRAME_LEN];
        read_exact_timeout(&mut stream, &mut etag_frame).await?;
        let requested_etag = unpad(&etag_frame);

        let mut path_frame = [0u8; PATH_FRAME_LEN];
        read_exact_timeout(&mut stream, &mut path_frame).await?;
        let requested_path = PathBuf::from(unpad(&path_frame));

        info!(request_id, path = %requested_path.display(), "pull request received");

        if fs::metadata(&requested_path).await.is_err() {
            warn!(request_id, path = %requested_path.display(), "requested path does not exist");
            write_timeout(&mut stream, &encode_size(SIZE_ERROR)).await?;
            return Ok(());
        }

        let archive_path = self.scratch_dir.join(format!("Backup-{request_id}.tar.gz"));
        let archive_result = snapshot(requested_path.clone(), archive_path.clone()).await;
        let current_etag = match archive_result {
            Ok(etag) => etag,
            Err(err) => {
                let _ = fs::remove_file(&archive_path).await;
                write_timeout(&mut stream, &encode_size(SIZE_ERROR)).await?;
                return Err(err);
            }
        };

        if current_etag == requested_etag {
            info!(request_id, "archive unchanged since last pull");
            write_timeout(&mut stream, &encode_size(SIZE_UNCHANGED)).await?;
            let _ = fs::remove_file(&archive_path).await;
            return Ok(());
        }

        let result = self.send_archive(&mut stream, &archive_path).await;
        let _ = fs::remove_file(&archive_path).await;
        result
    }

    async fn send_archive(&self, stream: &mut TcpStream, archive_path: &Path) -> Result<()> {
        let metadata = fs::metadata(archive_path)
            .await
            .map_err(|e| PullError::io(archive_path, e))?;
        let size = metadata.len();
        write_timeout(stream, &encode_size(size as i64)).await?;

        let mut file = fs::File::open(archive_path)
            .await
            .map_err(|e| PullError::io(archive_path, e))?;
        let mut buf = [0u8; BUFFER_BACKUP];
        loop {
            let read = timeout(PULL_TIMEOUT, file.read(&mut buf))
                .await
                .map_err(|_| PullError::Timeout)?
                .map_err(|e| PullError::io(archive_path, e))?;
            if read == 0 {
                break;
            }
            write_timeout(stream, &buf[..read]).await?;
        }
        Ok(())
    }
}

async fn snapshot(root: PathBuf, archive_path: PathBuf) -> Result<String> {
    let archive_for_create = archive_path.clone();
    tokio::task::spawn_blocking(move || create_archive(&root, &archive_for_create))
        .await
        .expect("snapshot task panicked")?;

    let etag = tokio::task::spawn_blocking(move || compute_archive_etag(&archive_path))
        .await
        .expect("etag task panicked")?;
    Ok(etag)
}

async fn read_exact_timeout(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    match timeout(PULL_TIMEOUT, stream.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(PullError::ConnectionClosed)
        }
        Ok(Err(err)) => Err(PullError::io("<socket>", err)),
        Err(_) => Err(PullError::Timeout),
    }
}

async fn write_timeout(stream: &mut TcpStream, buf: &[u8]) -> Result<()> {
    timeout(PULL_TIMEOUT, stream.write_all(buf))
        .await
        .map_err(|_| PullError::Timeout)?
        .map_err(|e| PullError::io("<socket>", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_kernel::{decode_size, pad, SIZE_ERROR};
    use std::net::SocketAddr;
    use std::num::NonZeroUsize;

    async fn spawn_server(scratch: PathBuf) -> (Arc<PullServer>, SocketAddr) {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = Arc::new(PullServer::bind(addr, scratch).await.unwrap());
        let local_addr = server.local_addr().unwrap();
        let scheduler = TaskScheduler::new(NonZeroUsize::new(4).unwrap());
        let running = Arc::clone(&server);
        tokio::spawn(async move {
            running.run(scheduler, std::future::pending()).await;
        });
        (server, local_addr)
    }

    #[tokio::test]
    async fn missing_path_returns_error_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let (_server, addr) = spawn_server(dir.path().join("scratch")).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&pad("", ETAG_FRAME_LEN)).await.unwrap();
        stream
            .write_all(&pad("/does/not/exist", PATH_FRAME_LEN))
            .await
            .unwrap();

        let mut size_frame = [0u8; 10];
        stream.read_exact(&mut size_frame).await.unwrap();
        assert_eq!(decode_size(&size_frame).unwrap(), SIZE_ERROR);
    }

    #[tokio::test]
    async fn fresh_pull_streams_a_nonempty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join("a.txt"), b"hello world").unwrap();

        let (_server, addr) = spawn_server(dir.path().join("scratch")).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&pad("", ETAG_FRAME_LEN)).await.unwrap();
        stream
            .write_all(&pad(&data_dir.display().to_string(), PATH_FRAME_LEN))
            .await
            .unwrap();

        let mut size_frame = [0u8; 10];
        stream.read_exact(&mut size_frame).await.unwrap();
        let size = decode_size(&size_frame).unwrap();
        assert!(size > 0);

        let mut body = vec![0u8; size as usize];
        stream.read_exact(&mut body).await.unwrap();
        assert_eq!(body.len(), size as usize);
    }

    #[tokio::test]
    async fn matching_etag_short_circuits_with_zero() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join("a.txt"), b"hello world").unwrap();

        let archive_path = dir.path().join("reference.tar.gz");
        create_archive(&data_dir, &archive_path).unwrap();
        let etag = compute_archive_etag(&archive_path).unwrap();

        let (_server, addr) = spawn_server(dir.path().join("scratch")).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&pad(&etag, ETAG_FRAME_LEN)).await.unwrap();
        stream
            .write_all(&pad(&data_dir.display().to_string(), PATH_FRAME_LEN))
            .await
            .unwrap();

        let mut size_frame = [0u8; 10];
        stream.read_exact(&mut size_frame).await.unwrap();
        assert_eq!(decode_size(&size_frame).unwrap(), 0);
    }
}
