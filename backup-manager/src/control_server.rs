//! TCP control server: answers line-delimited JSON `REGISTER`/`UNREGISTER`/`QUERY` verbs.

use std::sync::Arc;

use backup_kernel::{AddOutcome, ControlArgs, ControlFrame, RegistryError, RemoveOutcome, Verb};
use backup_primitives::AgentRecord;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

use crate::error::ControlError;

/// Accepts control connections and mutates the shared [`backup_kernel::Registry`]
/// in response to `REGISTER`/`UNREGISTER`/`QUERY` verbs.
pub struct ControlServer {
    listener: TcpListener,
    registry: Arc<backup_kernel::Registry>,
}

impl ControlServer {
    /// Binds the control server to `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(
        addr: std::net::SocketAddr,
        registry: Arc<backup_kernel::Registry>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, registry })
    }

    /// Returns the address the server is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying socket cannot report its address.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `shutdown` resolves. One task per
    /// connection; each connection may carry many sequential frames.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let registry = Arc::clone(&self.registry);
                            tokio::spawn(async move {
                                if let Err(err) = serve_connection(stream, registry).await {
                                    warn!(%peer, %err, "control connection ended with an error");
                                }
                            });
                        }
                        Err(err) => warn!(%err, "failed to accept control connection"),
                    }
                }
                () = &mut shutdown => {
                    info!("control server shutting down");
                    return;
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    registry: Arc<backup_kernel::Registry>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let frame = ControlFrame::parse_line(&line);
        let response = handle_frame(&frame, &registry).await;
        write_half.write_all(&response).await?;
    }
    Ok(())
}

async fn handle_frame(frame: &ControlFrame, registry: &backup_kernel::Registry) -> Vec<u8> {
    match frame.verb {
        Some(Verb::Register) => handle_register(&frame.args, registry).await,
        Some(Verb::Unregister) => handle_unregister(&frame.args, registry).await,
        Some(Verb::Query) => handle_query(&frame.args, registry).await,
        None => line_response(&ControlError::UnknownVerb.to_string()),
    }
}

fn required<'a>(value: &'a Option<String>, verb: &'static str, field: &'static str) -> Result<&'a str, ControlError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(ControlError::MissingField { verb, field })
}

async fn handle_register(args: &ControlArgs, registry: &backup_kernel::Registry) -> Vec<u8> {
    let fields = (|| {
        Ok::<_, ControlError>((
            required(&args.ip, "REGISTER", "Ip")?,
            required(&args.port, "REGISTER", "Port")?,
            required(&args.path, "REGISTER", "Path")?,
            required(&args.freq, "REGISTER", "Freq")?,
        ))
    })();

    let (ip, port, path, freq) = match fields {
        Ok(fields) => fields,
        Err(err) => return line_response(&err.to_string()),
    };

    let record = match AgentRecord::new(ip, port, path, freq, "") {
        Ok(record) => record,
        Err(err) => return line_response(&format!("invalid frequency: {err}")),
    };

    match registry.add(record).await {
        Ok(AddOutcome::Added(id)) => {
            info!(agent_id = %id, ip, port, path, "agent registered via control wire");
            line_response(&format!("registered {id}"))
        }
        Ok(AddOutcome::AlreadyRegistered) => line_response("already registered"),
        Err(RegistryError::InvalidFrequency(_)) => line_response("invalid frequency"),
        Err(err) => {
            warn!(%err, "registry add failed");
            line_response(&format!("registration failed: {err}"))
        }
    }
}

async fn handle_unregister(args: &ControlArgs, registry: &backup_kernel::Registry) -> Vec<u8> {
    let fields = (|| {
        Ok::<_, ControlError>((
            required(&args.ip, "UNREGISTER", "Ip")?,
            required(&args.port, "UNREGISTER", "Port")?,
            required(&args.path, "UNREGISTER", "Path")?,
        ))
    })();

    let (ip, port, path) = match fields {
        Ok(fields) => fields,
        Err(err) => return line_response(&err.to_string()),
    };

    match registry.remove(ip, port, path).await {
        Ok(RemoveOutcome::Removed) => {
            info!(ip, port, path, "agent unregistered via control wire");
            line_response("unregistered")
        }
        Ok(RemoveOutcome::NotRegistered) => line_response("not registered"),
        Err(err) => {
            warn!(%err, "registry remove failed");
            line_response(&format!("unregister failed: {err}"))
        }
    }
}

async fn handle_query(args: &ControlArgs, registry: &backup_kernel::Registry) -> Vec<u8> {
    let fields = (|| {
        Ok::<_, ControlError>((
            required(&args.ip, "QUERY", "Ip")?,
            required(&args.port, "QUERY", "Port")?,
            required(&args.path, "QUERY", "Path")?,
        ))
    })();

    let (ip, port, path) = match fields {
        Ok(fields) => fields,
        Err(err) => return query_error_response(&err.to_string()),
    };

    let log = match registry.open_log(ip, port, path).await {
        Ok(log) => log,
        Err(RegistryError::NotRegistered) => return query_error_response("agent not registered"),
        Err(err) => return query_error_response(&err.to_string()),
    };

    match log.read_all().await {
        Ok(bytes) => {
            let mut response = format!("{:010}", bytes.len()).into_bytes();
            response.extend_from_slice(&bytes);
            response
        }
        Err(err) => query_error_response(&err.to_string()),
    }
}

fn line_response(message: &str) -> Vec<u8> {
    format!("{message}\n").into_bytes()
}

fn query_error_response(message: &str) -> Vec<u8> {
    let mut response = b"0000000000".to_vec();
    response.extend_from_slice(format!("{message}\n").as_bytes());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_kernel::Registry;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;

    async fn spawn(registry: Arc<Registry>) -> SocketAddr {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = ControlServer::bind(addr, registry).await.unwrap();
        let local_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            server.run(std::future::pending()).await;
        });
        local_addr
    }

    async fn send_and_read(addr: SocketAddr, frame: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(frame.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();
        let mut buf = vec![0u8; 4096];
        let read = stream.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..read]).into_owned()
    }

    #[tokio::test]
    async fn register_then_list_contains_agent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();
        let addr = spawn(Arc::clone(&registry)).await;

        let response = send_and_read(
            addr,
            r#"{"Verb":"REGISTER","Args":{"Ip":"10.0.0.2","Port":"9000","Path":"/data","Freq":"30s"}}"#,
        )
        .await;
        assert!(response.starts_with("registered "));
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn register_with_garbage_frequency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();
        let addr = spawn(Arc::clone(&registry)).await;

        let response = send_and_read(
            addr,
            r#"{"Verb":"REGISTER","Args":{"Ip":"10.0.0.2","Port":"9000","Path":"/data","Freq":"forever"}}"#,
        )
        .await;
        assert!(response.contains("invalid frequency"));
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn unregister_unknown_agent_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();
        let addr = spawn(registry).await;

        let response = send_and_read(
            addr,
            r#"{"Verb":"UNREGISTER","Args":{"Ip":"10.0.0.2","Port":"9000","Path":"/data"}}"#,
        )
        .await;
        assert_eq!(response.trim(), "not registered");
    }

    #[tokio::test]
    async fn query_unknown_agent_returns_zero_size_and_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();
        let addr = spawn(registry).await;

        let response = send_and_read(
            addr,
            r#"{"Verb":"QUERY","Args":{"Ip":"10.0.0.2","Port":"9000","Path":"/data"}}"#,
        )
        .await;
        assert!(response.starts_with("0000000000"));
    }

    #[tokio::test]
    async fn unknown_verb_gets_plain_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::open(dir.path()).await.unwrap();
        let addr = spawn(registry).await;

        let response = send_and_read(addr, r#"{"Verb":"DESTROY","Args":{}}"#).await;
        assert_eq!(response.trim(), "unknown or missing verb");
    }
}
