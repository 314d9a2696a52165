//! Entry point of the console container (`bockos console-init`).

use std::convert::Infallible;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use bockos_common::{BockOsError, BockOsResult, OsPaths};
use bockos_config::Config;

use crate::boot::StepOutcome;
use crate::flavor::{self, Flavor};

/// Whether `user` has an entry in `passwd` contents.
#[must_use]
pub fn user_exists(passwd: &str, user: &str) -> bool {
    passwd
        .lines()
        .any(|line| line.split(':').next() == Some(user))
}

fn run_step(what: &str, mut command: Command) -> StepOutcome {
    match command.status() {
        Ok(status) if status.success() => StepOutcome::Ok,
        Ok(status) => {
            tracing::warn!(step = what, %status, "Console setup step failed");
            StepOutcome::Degraded(format!("{what} exited with {status}"))
        }
        Err(e) => {
            tracing::warn!(step = what, error = %e, "Console setup step could not run");
            StepOutcome::Degraded(format!("{what}: {e}"))
        }
    }
}

/// Make sure the console user exists, creating it with the flavor's tooling.
pub fn ensure_user(flavor: Flavor, user: &str, shell: &str, passwd_path: &Path) -> StepOutcome {
    let passwd = std::fs::read_to_string(passwd_path).unwrap_or_default();
    if user.is_empty() || user_exists(&passwd, user) {
        return StepOutcome::Ok;
    }
    tracing::info!(%user, %flavor, "Creating console user");
    run_step("add user", flavor.add_user_command(user, shell))
}

/// Mark the console as ready for the engine launcher.
///
/// # Errors
///
/// Returns an error if the sentinel cannot be written.
pub fn mark_ready(sentinel: &Path) -> BockOsResult<()> {
    if let Some(parent) = sentinel.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(sentinel, "")?;
    Ok(())
}

/// Set up the console and exec the login shell. Never returns `Ok`.
///
/// # Errors
///
/// Returns an error if the sentinel cannot be written, no shell is
/// configured or the exec fails.
pub fn run(paths: &OsPaths, config: &Config) -> BockOsResult<Infallible> {
    let os_release = std::fs::read_to_string("/etc/os-release").unwrap_or_default();
    let flavor = flavor::detect(&os_release);
    tracing::info!(%flavor, hostname = %config.host.hostname, "Initializing console");

    let [program, args @ ..] = config.host.shell.as_slice() else {
        return Err(BockOsError::config("host.shell is empty"));
    };

    if !config.host.hostname.is_empty() {
        run_step("set hostname", flavor::hostname_command(&config.host.hostname));
    }
    ensure_user(flavor, &config.host.user, program, Path::new("/etc/passwd"));

    mark_ready(&paths.console_ready())?;
    tracing::debug!(sentinel = %paths.console_ready().display(), "Console ready");

    let source = Command::new(program).args(args).exec();
    Err(BockOsError::Exec {
        program: program.clone(),
        source,
    })
}
