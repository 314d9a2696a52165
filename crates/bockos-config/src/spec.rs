//! Declarative system container specification.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One container the OS launches during boot.
///
/// Field values are kept as the strings written in the document; translation
/// into engine structures happens in `bockos-engine` on every boot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container id, unique within a list. Also the engine container name.
    #[serde(default)]
    pub id: String,

    /// Image reference (`repo[:tag]`).
    #[serde(default)]
    pub image: String,

    /// Command override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,

    /// Environment as `KEY=VALUE` entries. A bare `KEY` is resolved at boot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,

    /// Labels as `KEY=VALUE` entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    /// Volumes (`/path`) and binds (`/host:/container[:mode]`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,

    /// Containers whose volumes are shared with this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<String>,

    /// Published ports (`[ip:][host:]container[/proto]`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,

    /// Ports exposed without publishing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expose: Vec<String>,

    /// Device mappings (`host[:container[:perms]]`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,

    /// Network mode (`bridge`, `host`, `none`, `container:<id>` or a network name).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub net: String,

    /// PID namespace mode.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pid: String,

    /// IPC namespace mode.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipc: String,

    /// UTS namespace mode.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uts: String,

    /// Capabilities to add.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,

    /// Capabilities to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_drop: Vec<String>,

    /// Restart policy (`no`, `always`, `unless-stopped`, `on-failure[:N]`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub restart: String,

    /// Run privileged.
    #[serde(default)]
    pub privileged: bool,

    /// Allocate a TTY.
    #[serde(default)]
    pub tty: bool,

    /// Keep stdin open.
    #[serde(default)]
    pub stdin_open: bool,

    /// Working directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,

    /// User to run as.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,

    /// Engine log driver.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_driver: String,

    /// Local image archive imported before the first create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<PathBuf>,
}

impl ContainerSpec {
    /// An empty spec carrying only an id.
    #[must_use]
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Parse a single spec from YAML.
    ///
    /// # Errors
    ///
    /// Returns the parser error if the document is not a valid spec.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
