//! The typed configuration document.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use bockos_common::{BockOsError, BockOsResult};
use serde::{Deserialize, Serialize};

use crate::spec::ContainerSpec;

/// Built-in defaults, the lowest-precedence layer.
pub const DEFAULTS_YAML: &str = include_str!("defaults.yml");

/// Id of the system container slot that holds the console.
pub const CONSOLE_SLOT: &str = "console";

/// Console selector meaning "use the slot entry from `system_containers`".
pub const DEFAULT_CONSOLE: &str = "default";

/// Merged bockos configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Debug logging.
    #[serde(default)]
    pub debug: bool,

    /// Rescue mode: boot only `rescue_container`.
    #[serde(default)]
    pub rescue: bool,

    /// Selected console service.
    #[serde(default = "default_console")]
    pub console: String,

    /// Directory for import stamps.
    #[serde(default)]
    pub state_dir: PathBuf,

    /// Image archives loaded at boot.
    #[serde(default)]
    pub images: ImagesConfig,

    /// Container ids skipped at boot.
    #[serde(default)]
    pub disable: BTreeSet<String>,

    /// Engine started by PID 1.
    #[serde(default)]
    pub system_engine: SystemEngineConfig,

    /// User-facing engine launched by `engine-init`.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Host identity.
    #[serde(default)]
    pub host: HostConfig,

    /// Network settings, consumed by the network container.
    #[serde(default)]
    pub network: BTreeMap<String, serde_yaml::Value>,

    /// System containers in boot order.
    #[serde(default)]
    pub system_containers: Vec<ContainerSpec>,

    /// The only container started in rescue mode.
    #[serde(default)]
    pub rescue_container: ContainerSpec,

    /// Named services that can be selected as console.
    #[serde(default)]
    pub services: BTreeMap<String, ContainerSpec>,
}

fn default_console() -> String {
    DEFAULT_CONSOLE.to_string()
}

/// Image archive discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Directory scanned at boot.
    #[serde(default)]
    pub dir: PathBuf,
    /// Glob pattern matched inside `dir`.
    #[serde(default)]
    pub pattern: String,
}

/// Engine launched directly by PID 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemEngineConfig {
    /// API socket.
    #[serde(default)]
    pub socket: PathBuf,
    /// Candidate binaries, first executable wins.
    #[serde(default)]
    pub binaries: Vec<PathBuf>,
    /// Used when no candidate is executable.
    #[serde(default)]
    pub fallback_binary: PathBuf,
    /// Launch arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Pings (one per second) before giving up on the engine.
    #[serde(default)]
    pub ping_attempts: u32,
}

/// User-facing engine, run inside the engine system container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// System container running this engine; restarted on console switch.
    #[serde(default)]
    pub container: String,
    /// Variant string written to the engine-ready sentinel.
    #[serde(default)]
    pub variant: String,
    /// Environment file sourced before launch.
    #[serde(default)]
    pub env_file: PathBuf,
    /// Candidate binaries, first executable wins.
    #[serde(default)]
    pub binaries: Vec<PathBuf>,
    /// Used when no candidate is executable.
    #[serde(default)]
    pub fallback_binary: PathBuf,
    /// Launch arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Seconds the engine gets to stop when restarted.
    #[serde(default)]
    pub restart_timeout: u64,
}

/// Host identity applied by the console.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Hostname.
    #[serde(default)]
    pub hostname: String,
    /// Interactive user created in the console.
    #[serde(default)]
    pub user: String,
    /// Command the console hands off to.
    #[serde(default)]
    pub shell: Vec<String>,
}

impl Config {
    /// Parse the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded document is invalid.
    pub fn defaults() -> BockOsResult<Self> {
        serde_yaml::from_str(DEFAULTS_YAML).map_err(|e| BockOsError::ConfigParse {
            path: "<defaults>".to_string(),
            message: e.to_string(),
        })
    }

    /// Id of the console container.
    #[must_use]
    pub fn console_id(&self) -> &str {
        if self.console == DEFAULT_CONSOLE {
            CONSOLE_SLOT
        } else {
            &self.console
        }
    }

    /// Whether a container id is on the disable list.
    #[must_use]
    pub fn is_disabled(&self, id: &str) -> bool {
        self.disable.contains(id)
    }

    /// Look up a catalog service, naming it after its key when it has no id.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<ContainerSpec> {
        self.services.get(name).map(|spec| {
            let mut spec = spec.clone();
            if spec.id.is_empty() {
                spec.id = name.to_string();
            }
            spec
        })
    }

    /// Find a service in the catalog, then in `<services_dir>/<name>.yml`.
    ///
    /// # Errors
    ///
    /// Returns [`BockOsError::ServiceNotFound`] when neither source defines
    /// it, or a parse error when the file is malformed.
    pub fn find_service(&self, name: &str, services_dir: &Path) -> BockOsResult<ContainerSpec> {
        if let Some(spec) = self.service(name) {
            return Ok(spec);
        }

        let path = services_dir.join(format!("{name}.yml"));
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BockOsError::ServiceNotFound {
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut spec =
            ContainerSpec::from_yaml(&content).map_err(|e| BockOsError::ConfigParse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if spec.id.is_empty() {
            spec.id = name.to_string();
        }
        Ok(spec)
    }

    /// The containers a boot should run, in order.
    ///
    /// In rescue mode this is the rescue spec alone. Otherwise it is the
    /// system container list with the console slot resolved to the selected
    /// console service. The disable list is not applied here.
    #[must_use]
    pub fn boot_containers(&self) -> Vec<ContainerSpec> {
        if self.rescue {
            return vec![self.rescue_container.clone()];
        }

        self.system_containers
            .iter()
            .map(|spec| {
                if spec.id != CONSOLE_SLOT || self.console == DEFAULT_CONSOLE {
                    return spec.clone();
                }
                self.service(&self.console).unwrap_or_else(|| {
                    tracing::warn!(
                        console = %self.console,
                        "Selected console is not defined, using the default console"
                    );
                    spec.clone()
                })
            })
            .collect()
    }

    /// Image archives matching `images.pattern` under `images.dir`.
    ///
    /// A missing directory yields no archives.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid glob.
    pub fn image_archives(&self) -> BockOsResult<Vec<PathBuf>> {
        if !self.images.dir.is_dir() {
            tracing::debug!(dir = %self.images.dir.display(), "Images directory missing");
            return Ok(Vec::new());
        }

        let pattern = self.images.dir.join(&self.images.pattern);
        let entries = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| BockOsError::config(format!("invalid images pattern: {e}")))?;

        let mut archives: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(path),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable image archive");
                    None
                }
            })
            .collect();
        archives.sort();
        Ok(archives)
    }
}
