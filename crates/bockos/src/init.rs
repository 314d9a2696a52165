//! PID 1 (`bockos init`).

use std::process::{Command, Stdio};
use std::sync::Arc;

use bockos_common::{BockOsError, BockOsResult};
use bockos_config::{Config, ConfigStore};
use bockos_engine::{DockerEngine, Engine, stdin_is_tty};
use tokio::signal::unix::{SignalKind, signal};

use crate::boot::engine::resolve_binary;
use crate::{reaper, sysinit};

/// Start the system engine as a child of init.
///
/// The child is not waited on here; its exit is collected by the reaper.
///
/// # Errors
///
/// Returns an error if the binary cannot be spawned.
#[allow(clippy::zombie_processes)]
pub fn spawn_system_engine(config: &Config) -> BockOsResult<u32> {
    let binary = resolve_binary(
        &config.system_engine.binaries,
        &config.system_engine.fallback_binary,
    );
    let child = Command::new(&binary)
        .args(&config.system_engine.args)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|source| BockOsError::Exec {
            program: binary.display().to_string(),
            source,
        })?;
    let pid = child.id();
    tracing::info!(pid, binary = %binary.display(), "System engine started");
    Ok(pid)
}

async fn wait_for_shutdown() -> BockOsResult<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = terminate.recv() => tracing::info!("Received SIGTERM, shutting down"),
        _ = interrupt.recv() => tracing::info!("Received SIGINT, shutting down"),
    }
    Ok(())
}

/// Reap, start the system engine, boot, then keep reaping until shutdown.
///
/// # Errors
///
/// Returns an error if the system engine cannot be started or system-init
/// fails; both end the process with a non-zero status.
pub async fn run(store: &ConfigStore) -> BockOsResult<()> {
    tokio::spawn(async {
        if let Err(e) = reaper::run().await {
            tracing::error!(error = %e, "Reaper failed to start");
        }
    });

    let config = store.config();
    spawn_system_engine(&config)?;

    let engine: Arc<dyn Engine> = Arc::new(DockerEngine::new(&config.system_engine.socket));
    sysinit::run(store, engine, stdin_is_tty()).await?;
    tracing::info!("Boot complete");

    wait_for_shutdown().await?;
    rustix::fs::sync();
    Ok(())
}
