//! Environment file sourcing with a single re-exec.

use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use bockos_common::{BockOsError, BockOsResult};

/// Set in the environment of the re-executed process.
pub const SOURCED_GUARD: &str = "_BOCKOS_ENV_SOURCED";

/// Parse a shell-style environment file.
///
/// Accepts `KEY=VALUE` lines with an optional `export ` prefix, single or
/// double quoted values and `#` comments. Malformed lines are skipped.
#[must_use]
pub fn parse_env_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if !is_identifier(key) {
                tracing::debug!(line, "Skipping malformed environment line");
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    // Unquoted values end at an inline comment.
    value
        .split_once(" #")
        .map_or(value, |(v, _)| v.trim_end())
}

/// Whether this process still has to source `env_file`.
#[must_use]
pub fn needs_sourcing(guard: Option<&OsString>, env_file: &Path) -> bool {
    guard.is_none() && env_file.is_file()
}

/// Re-exec the current process once with `env_file` applied.
///
/// Returns `Ok(())` when nothing has to be done: the guard is already set or
/// the file does not exist. On success the process image is replaced and
/// this never returns.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the re-exec fails.
pub fn source_once(env_file: &Path) -> BockOsResult<()> {
    if !needs_sourcing(std::env::var_os(SOURCED_GUARD).as_ref(), env_file) {
        return Ok(());
    }

    let vars = parse_env_file(&std::fs::read_to_string(env_file)?);
    let exe = std::env::current_exe()?;
    tracing::info!(
        env_file = %env_file.display(),
        count = vars.len(),
        "Re-executing with sourced environment"
    );

    let source = Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .envs(vars)
        .env(SOURCED_GUARD, "1")
        .exec();
    Err(BockOsError::Exec {
        program: exe.display().to_string(),
        source,
    })
}
