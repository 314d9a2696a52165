//! Bulk loading of bundled image archives.

use std::path::{Path, PathBuf};

use bockos_common::BockOsResult;
use bockos_common::paths::stamp_path;

use crate::client::Engine;
use crate::lifecycle::write_stamp;

/// Stamp id for an archive: `image-<file name>`.
fn archive_stamp_id(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map_or_else(|| archive.display().to_string(), |n| n.to_string_lossy().into_owned());
    format!("image-{name}")
}

/// Load every archive not yet stamped under `state_dir`.
///
/// Returns the number of archives actually loaded.
///
/// # Errors
///
/// Stops at and returns the first load failure; archives loaded before it
/// stay stamped.
pub async fn load_archives(
    engine: &dyn Engine,
    archives: &[PathBuf],
    state_dir: &Path,
) -> BockOsResult<usize> {
    let mut loaded = 0;
    for archive in archives {
        let stamp = stamp_path(state_dir, &archive_stamp_id(archive));
        if stamp.exists() {
            tracing::debug!(archive = %archive.display(), "Archive already loaded");
            continue;
        }

        tracing::info!(archive = %archive.display(), "Loading image archive");
        engine.load_image(archive).await?;
        write_stamp(&stamp, &archive.display().to_string());
        loaded += 1;
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_ids_use_file_name() {
        assert_eq!(
            archive_stamp_id(Path::new("/usr/share/bockos/images/syslog.tar")),
            "image-syslog.tar"
        );
    }
}
