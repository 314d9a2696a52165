//! Engine binary resolution and argument assembly.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Extra engine flags, appended verbatim after splitting on whitespace.
pub const ENGINE_OPTS: &str = "ENGINE_OPTS";

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

/// First executable candidate, else `fallback`.
#[must_use]
pub fn resolve_binary(candidates: &[PathBuf], fallback: &Path) -> PathBuf {
    candidates
        .iter()
        .find(|candidate| is_executable(candidate))
        .cloned()
        .unwrap_or_else(|| {
            tracing::warn!(fallback = %fallback.display(), "No engine binary found, using fallback");
            fallback.to_path_buf()
        })
}

/// Configured arguments, then command-line arguments, then `ENGINE_OPTS`.
#[must_use]
pub fn engine_args(configured: &[String], cli: &[String], engine_opts: Option<&str>) -> Vec<String> {
    configured
        .iter()
        .chain(cli)
        .cloned()
        .chain(
            engine_opts
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn first_executable_wins() {
        let temp = tempfile::tempdir().unwrap();
        let plain = temp.path().join("plain");
        let exec = temp.path().join("dockerd");
        fs::write(&plain, "").unwrap();
        fs::write(&exec, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&exec, fs::Permissions::from_mode(0o755)).unwrap();

        let candidates = vec![temp.path().join("missing"), plain, exec.clone()];
        assert_eq!(resolve_binary(&candidates, Path::new("/fallback")), exec);
    }

    #[test]
    fn fallback_when_nothing_matches() {
        let candidates = vec![PathBuf::from("/nonexistent/dockerd")];
        assert_eq!(
            resolve_binary(&candidates, Path::new("/usr/bin/dockerd")),
            PathBuf::from("/usr/bin/dockerd")
        );
    }

    #[test]
    fn args_are_appended_in_order() {
        let args = engine_args(
            &["--host".to_string(), "unix:///var/run/docker.sock".to_string()],
            &["--debug".to_string()],
            Some("  --mtu 1400 "),
        );
        assert_eq!(
            args,
            vec!["--host", "unix:///var/run/docker.sock", "--debug", "--mtu", "1400"]
        );
        assert_eq!(engine_args(&[], &[], None), Vec::<String>::new());
    }
}
