//! Mount propagation for the engine.

use std::path::Path;

use rustix::mount::{MountPropagationFlags, mount_change};

use super::StepOutcome;

/// Make `target` and everything below it a shared mount.
fn make_rshared(target: &Path) -> std::io::Result<()> {
    mount_change(target, MountPropagationFlags::SHARED | MountPropagationFlags::REC)?;
    Ok(())
}

/// Mark each target shared and recursive. Failures are logged, not raised.
pub fn make_shared(targets: &[&Path]) -> StepOutcome {
    let mut failed = Vec::new();
    for target in targets {
        tracing::debug!(mount = %target.display(), "Making mount rshared");
        if let Err(e) = make_rshared(target) {
            tracing::warn!(mount = %target.display(), error = %e, "Failed to change mount propagation");
            failed.push(target.display().to_string());
        }
    }

    if failed.is_empty() {
        StepOutcome::Ok
    } else {
        StepOutcome::Degraded(format!("propagation unchanged on {}", failed.join(", ")))
    }
}
