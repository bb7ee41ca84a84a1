//! Manager binary: owns the agent registry, the control server, and the
//! scheduler that pulls snapshots from every registered agent.

use std::num::NonZeroUsize;

use anyhow::Result;
use backup_config::ManagerConfig;
use backup_kernel::{Registry, TaskScheduler};
use backup_manager::{ControlServer, Scheduler};
use tokio::signal::ctrl_c;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ManagerConfig::from_env()?;
    backup_telemetry::init_tracing(&config.log_filter);

    info!(
        control_addr = %config.control_addr,
        storage_root = %config.storage_root.display(),
        tick_window = ?config.tick_window,
        "starting backup manager"
    );

    let registry = Registry::open(&config.storage_root).await?;
    let control_server = ControlServer::bind(config.control_addr, registry.clone()).await?;
    let scheduler = Scheduler::new(registry, config.tick_window);
    let task_scheduler = TaskScheduler::new(NonZeroUsize::new(32).expect("non-zero"));

    tokio::join!(
        control_server.run(shutdown_signal()),
        scheduler.run(task_scheduler, shutdown_signal()),
    );

    info!("backup manager stopped");
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
