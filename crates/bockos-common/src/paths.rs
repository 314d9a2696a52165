//! Standard filesystem paths for bockos.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Default root directory for persistent bockos data.
pub static BOCKOS_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("BOCKOS_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/bockos"))
});

/// Default runtime directory for bockos sentinels and sockets.
pub static BOCKOS_RUNTIME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("BOCKOS_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/run/bockos"))
});

/// Standard paths used during boot.
#[derive(Debug, Clone)]
pub struct OsPaths {
    /// Persistent data root (default: /var/lib/bockos).
    pub root: PathBuf,
    /// Runtime directory (default: /run/bockos).
    pub runtime: PathBuf,
}

impl OsPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let runtime = root.join("run");
        Self { root, runtime }
    }

    /// Directory holding persisted configuration.
    #[must_use]
    pub fn conf_dir(&self) -> PathBuf {
        self.root.join("conf")
    }

    /// The persisted configuration document.
    #[must_use]
    pub fn persisted_config(&self) -> PathBuf {
        self.conf_dir().join("bockos.yml")
    }

    /// Metadata blob dropped by the cloud data source.
    #[must_use]
    pub fn cloud_config(&self) -> PathBuf {
        self.conf_dir().join("cloud-config.yml")
    }

    /// Directory of on-disk service definitions (`<name>.yml`).
    #[must_use]
    pub fn services_dir(&self) -> PathBuf {
        self.conf_dir().join("services")
    }

    /// Default state directory for import stamps.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    /// Sentinel written once the console is usable.
    #[must_use]
    pub fn console_ready(&self) -> PathBuf {
        self.runtime.join("console-done")
    }

    /// Sentinel written (with the engine variant) before the engine starts.
    #[must_use]
    pub fn engine_ready(&self) -> PathBuf {
        self.runtime.join("engine-done")
    }

    /// Create all necessary directories.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.runtime)?;
        std::fs::create_dir_all(self.conf_dir())?;
        std::fs::create_dir_all(self.services_dir())?;
        Ok(())
    }
}

impl Default for OsPaths {
    fn default() -> Self {
        Self {
            root: BOCKOS_ROOT.clone(),
            runtime: BOCKOS_RUNTIME_DIR.clone(),
        }
    }
}

/// Stamp file marking that the image for `id` has been imported.
#[must_use]
pub fn stamp_path(state_dir: &Path, id: &str) -> PathBuf {
    state_dir.join("stamps").join(id)
}
