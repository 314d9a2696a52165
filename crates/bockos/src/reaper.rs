//! Zombie reaping for PID 1.
//!
//! Orphaned processes are re-parented to init; their exit status must be
//! collected or they stay in the process table forever.

#![allow(unsafe_code)]

use bockos_common::BockOsResult;
use tokio::signal::unix::{SignalKind, signal};

/// Collect every terminated child without blocking.
///
/// Stops on the first `waitpid` error or non-positive pid; `ECHILD` is the
/// normal way out and any other error is treated the same.
pub fn reap_zombies() -> usize {
    let mut reaped = 0;
    loop {
        let mut status: libc::c_int = 0;
        let pid = unsafe { libc::waitpid(-1, &raw mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }

        let exit_code = if libc::WIFEXITED(status) {
            libc::WEXITSTATUS(status)
        } else if libc::WIFSIGNALED(status) {
            128 + libc::WTERMSIG(status)
        } else {
            1
        };
        tracing::debug!(pid, exit_code, "Reaped child");
        reaped += 1;
    }
    reaped
}

/// Run the reaper until the signal stream ends.
///
/// # Errors
///
/// Returns an error if the `SIGCHLD` handler cannot be installed.
pub async fn run() -> BockOsResult<()> {
    let mut children = signal(SignalKind::child())?;
    // Children that exited before the handler was installed.
    reap_zombies();
    while children.recv().await.is_some() {
        reap_zombies();
    }
    tracing::warn!("Child signal stream closed, reaper stopping");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    #[test]
    fn exited_child_is_collected() {
        let child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        // Leak the handle so only the reaper waits on it.
        std::mem::forget(child);

        let mut collected = 0;
        for _ in 0..100 {
            collected += reap_zombies();
            if collected > 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(collected >= 1, "child {pid} was not reaped");
    }
}
