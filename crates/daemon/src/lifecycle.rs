// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use nx_adapters::{AllowAllGate, HttpCallbackAdapter, LogNotifyAdapter};
use nx_core::{ConfigError, NexusConfig, SystemClock, UuidIdGen};
use nx_engine::{Nexus, Runtime, RuntimeDeps, RuntimeError};
use nx_storage::{Store, StoreError};
use thiserror::Error;
use tokio::net::UnixListener;
use tracing::{info, warn};

/// Daemon runtime with concrete adapter types
pub type DaemonRuntime = Runtime<AllowAllGate, LogNotifyAdapter, SystemClock, UuidIdGen>;

/// The engine the server dispatches requests to
pub type DaemonNexus = Nexus<AllowAllGate, LogNotifyAdapter, SystemClock, UuidIdGen>;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the store, lock and log
    pub state_dir: PathBuf,
    /// Path to `nxd.toml`
    pub config_path: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Directory of the write-ahead log
    pub store_dir: PathBuf,
}

impl Config {
    /// Resolve paths from the environment
    ///
    /// `NXD_STATE_DIR` picks the state directory; `NXD_SOCKET` overrides the
    /// socket path. An explicit `config_path` wins over `<state>/nxd.toml`.
    pub fn from_env(config_path: Option<PathBuf>) -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        let socket_path = match std::env::var("NXD_SOCKET") {
            Ok(path) => PathBuf::from(path),
            Err(_) => state_dir.join("nxd.sock"),
        };
        let mut config = Self::in_dir(&state_dir);
        config.socket_path = socket_path;
        if let Some(path) = config_path {
            config.config_path = path;
        }
        Ok(config)
    }

    /// Every path under one directory
    pub fn in_dir(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            config_path: state_dir.join("nxd.toml"),
            socket_path: state_dir.join("nxd.sock"),
            lock_path: state_dir.join("nxd.pid"),
            log_path: state_dir.join("nxd.log"),
            store_dir: state_dir.join("store"),
        }
    }
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub runtime: DaemonRuntime,
    pub start_time: Instant,
}

impl DaemonState {
    pub fn nexus(&self) -> Arc<DaemonNexus> {
        Arc::clone(self.runtime.nexus())
    }

    /// Shutdown the daemon gracefully
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        self.runtime.shutdown().await;

        if self.config.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            }
        }
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }

        // Lock released when lock_file drops
        info!("Daemon shutdown complete");
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // Another daemon owns the socket and PID file; leave them alone
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory (needed for socket, lock, etc.)
    std::fs::create_dir_all(&config.state_dir)?;
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // 2. Acquire lock file FIRST - prevents races
    let mut lock_file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    // 3. Load configuration BEFORE binding socket (fail fast)
    let nexus_config = NexusConfig::load(&config.config_path)?;
    info!(
        path = %config.config_path.display(),
        services = nexus_config.services.len(),
        "configuration loaded"
    );

    // 4. Open the store (replays the WAL)
    std::fs::create_dir_all(&config.store_dir)?;
    let store = Arc::new(Store::open(&config.store_dir)?);
    info!(operations = store.operation_count(), "store opened");

    // 5. Start the engine; recovery re-dispatches open operations
    let deps = RuntimeDeps {
        auth: AllowAllGate::new(),
        callbacks: HttpCallbackAdapter::new(nexus_config.delivery.request_timeout),
        notify: LogNotifyAdapter::new(),
    };
    let runtime = Runtime::start(nexus_config, store, deps, SystemClock, UuidIdGen).await?;

    // 6. Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(state_dir = %config.state_dir.display(), "Daemon started");

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        runtime,
        start_time: Instant::now(),
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &Config) {
    if config.socket_path.exists() {
        let _ = std::fs::remove_file(&config.socket_path);
    }
    if config.lock_path.exists() {
        let _ = std::fs::remove_file(&config.lock_path);
    }
}

/// Get the state directory for nxd
fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("NXD_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("nxd"));
    }

    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/nxd"))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
