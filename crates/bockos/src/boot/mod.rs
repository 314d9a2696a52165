//! Engine-launcher boot path (`bockos engine-init`).
//!
//! Runs inside the engine system container: source the engine environment,
//! wait for the console, prepare mounts, then replace this process with the
//! engine daemon.

pub mod console;
pub mod engine;
pub mod env;
pub mod mounts;
pub mod ramdisk;

use std::convert::Infallible;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use bockos_common::{BockOsError, BockOsResult, OsPaths};
use bockos_config::Config;

/// Result of a best-effort step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Completed.
    Ok,
    /// Partially or not done; boot continues.
    Degraded(String),
}

impl StepOutcome {
    /// Whether the step completed fully.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Everything needed to exec the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLaunch {
    /// Resolved daemon binary.
    pub binary: PathBuf,
    /// Full argument list.
    pub args: Vec<String>,
    /// Extra environment for the daemon.
    pub env: Vec<(String, String)>,
}

impl EngineLaunch {
    /// Resolve the binary and assemble arguments from `config` and `cli_args`.
    #[must_use]
    pub fn plan(config: &Config, cli_args: &[String], engine_opts: Option<&str>, ramdisk: bool) -> Self {
        let binary = engine::resolve_binary(&config.engine.binaries, &config.engine.fallback_binary);
        let args = engine::engine_args(&config.engine.args, cli_args, engine_opts);
        let env = if ramdisk {
            vec![(ramdisk::DOCKER_RAMDISK.to_string(), "true".to_string())]
        } else {
            Vec::new()
        };
        Self { binary, args, env }
    }
}

/// Write the engine-ready marker containing the engine variant.
///
/// # Errors
///
/// Returns an error if the marker cannot be written.
pub fn write_engine_ready(marker: &Path, variant: &str) -> BockOsResult<()> {
    if let Some(parent) = marker.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(marker, variant)?;
    Ok(())
}

/// Replace this process with the engine. Only returns on failure.
pub fn exec_engine(launch: &EngineLaunch) -> BockOsError {
    tracing::info!(
        binary = %launch.binary.display(),
        args = ?launch.args,
        "Handing off to engine"
    );
    let source = Command::new(&launch.binary)
        .args(&launch.args)
        .envs(launch.env.iter().cloned())
        .exec();
    BockOsError::Exec {
        program: launch.binary.display().to_string(),
        source,
    }
}

/// The full engine-launcher sequence. Never returns `Ok`.
///
/// # Errors
///
/// Returns an error if sourcing, the ready marker or the exec fails.
pub async fn engine_init(
    paths: &OsPaths,
    config: &Config,
    cli_args: &[String],
) -> BockOsResult<Infallible> {
    env::source_once(&config.engine.env_file)?;

    console::wait_for_console(&paths.console_ready(), console::POLL_INTERVAL).await;

    if let StepOutcome::Degraded(reason) = mounts::make_shared(&[Path::new("/"), paths.runtime.as_path()]) {
        tracing::warn!(%reason, "Continuing without shared mounts");
    }

    let ramdisk = ramdisk::storage_is_ramdisk(&paths.root);
    if ramdisk {
        tracing::info!(root = %paths.root.display(), "Persistent storage is a ramdisk");
    }

    let engine_opts = std::env::var(engine::ENGINE_OPTS).ok();
    let launch = EngineLaunch::plan(config, cli_args, engine_opts.as_deref(), ramdisk);

    write_engine_ready(&paths.engine_ready(), &config.engine.variant)?;
    Err(exec_engine(&launch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_sets_ramdisk_flag() {
        let config = Config::defaults().unwrap();
        let launch = EngineLaunch::plan(&config, &[], None, true);
        assert_eq!(launch.env, vec![("DOCKER_RAMDISK".to_string(), "true".to_string())]);
        assert_eq!(launch.args, config.engine.args);

        let launch = EngineLaunch::plan(&config, &[], Some("--debug"), false);
        assert!(launch.env.is_empty());
        assert_eq!(launch.args.last().map(String::as_str), Some("--debug"));
    }

    #[test]
    fn ready_marker_holds_variant() {
        let temp = tempfile::tempdir().unwrap();
        let marker = temp.path().join("run").join("engine-done");
        write_engine_ready(&marker, "docker").unwrap();
        assert_eq!(std::fs::read_to_string(marker).unwrap(), "docker");
    }

    #[test]
    fn exec_failure_is_reported() {
        let launch = EngineLaunch {
            binary: PathBuf::from("/nonexistent/dockerd"),
            args: Vec::new(),
            env: Vec::new(),
        };
        let err = exec_engine(&launch);
        assert!(matches!(err, BockOsError::Exec { ref program, .. } if program == "/nonexistent/dockerd"));
    }
}
