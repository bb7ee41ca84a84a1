//! Environment-variable configuration for the backup manager and agent.
//!
//! Both binaries follow the same loader shape: an optional `.env` file in
//! the working directory is read first (for local development), then real
//! process environment variables are read on top -- a variable already set
//! in the environment always wins over the `.env` file.

#![warn(missing_docs, clippy::pedantic)]

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that failed to parse.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// The environment variable name.
        var: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },
}

/// Result alias for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

fn env_or(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T>(var: &'static str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Configuration for the Manager binary, prefixed `BKPMNGR_` in the environment.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Address the control server listens on.
    pub control_addr: SocketAddr,
    /// Root directory for the registry file, per-agent directories, and snapshots.
    pub storage_root: PathBuf,
    /// Scheduler tick period.
    pub tick_window: Duration,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl ManagerConfig {
    /// Loads configuration from `BKPMNGR_*` environment variables, falling
    /// back to built-in defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env_or("BKPMNGR_HOST", "0.0.0.0");
        let port: u16 = parse_env("BKPMNGR_PORT", 7700)?;
        let control_addr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                var: "BKPMNGR_HOST",
                value: host,
            })?;

        let storage_root = PathBuf::from(env_or("BKPMNGR_STORAGE_ROOT", "./backup-manager-data"));
        let tick_secs: u64 = parse_env("BKPMNGR_TICK_SECS", 10)?;
        let log_filter = env_or("BKPMNGR_LOG", "info");

        Ok(Self {
            control_addr,
            storage_root,
            tick_window: Duration::from_secs(tick_secs),
            log_filter,
        })
    }
}

/// Configuration for the Agent binary, prefixed `APP_` in the environment.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address the pull server listens on.
    pub pull_addr: SocketAddr,
    /// Scratch directory used for transient per-request snapshot archives.
    pub scratch_dir: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl AgentConfig {
    /// Loads configuration from `APP_*` environment variables, falling back
    /// to built-in defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env_or("APP_HOST", "0.0.0.0");
        let port: u16 = parse_env("APP_PORT", 7800)?;
        let pull_addr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                var: "APP_HOST",
                value: host,
            })?;

        let scratch_dir = PathBuf::from(env_or("APP_SCRATCH_DIR", "./backup-agent-scratch"));
        let log_filter = env_or("APP_LOG", "info");

        Ok(Self {
            pull_addr,
            scratch_dir,
            log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn manager_config_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in [
            "BKPMNGR_HOST",
            "BKPMNGR_PORT",
            "BKPMNGR_STORAGE_ROOT",
            "BKPMNGR_TICK_SECS",
            "BKPMNGR_LOG",
        ] {
            unsafe { env::remove_var(var) };
        }
        let config = ManagerConfig::from_env().unwrap();
        assert_eq!(config.control_addr.port(), 7700);
        assert_eq!(config.tick_window, Duration::from_secs(10));
    }

    #[test]
    fn agent_config_respects_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("APP_PORT", "9100");
            env::set_var("APP_SCRATCH_DIR", "/tmp/scratch");
        }
        let config = AgentConfig::from_env().unwrap();
        assert_eq!(config.pull_addr.port(), 9100);
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/scratch"));
        unsafe {
            env::remove_var("APP_PORT");
            env::remove_var("APP_SCRATCH_DIR");
        }
    }

    #[test]
    fn rejects_invalid_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { env::set_var("BKPMNGR_PORT", "not-a-port") };
        assert!(ManagerConfig::from_env().is_err());
        unsafe { env::remove_var("BKPMNGR_PORT") };
    }
}
