//! Agent binary: serves one directory for backup over the pull protocol.

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use backup_agent::PullServer;
use backup_config::AgentConfig;
use backup_kernel::TaskScheduler;
use tokio::signal::ctrl_c;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AgentConfig::from_env()?;
    backup_telemetry::init_tracing(&config.log_filter);

    info!(addr = %config.pull_addr, scratch = %config.scratch_dir.display(), "starting backup agent");

    let server = Arc::new(PullServer::bind(config.pull_addr, config.scratch_dir).await?);
    let scheduler = TaskScheduler::new(NonZeroUsize::new(32).expect("non-zero"));

    server.run(scheduler, shutdown_signal()).await;
    info!("backup agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
