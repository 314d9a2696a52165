//! Engine-native container configuration (Docker API wire format).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON `{}` used as the value of port and volume sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Body of `POST /containers/create`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateConfig {
    /// Image reference.
    pub image: String,
    /// Command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    /// Entrypoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    /// Environment, `KEY=VALUE`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Exposed ports, keyed `port/proto`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, Empty>,
    /// Anonymous volumes, keyed by container path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, Empty>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,
    /// User.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Allocate a TTY.
    #[serde(default)]
    pub tty: bool,
    /// Keep stdin open.
    #[serde(default)]
    pub open_stdin: bool,
    /// Close stdin after the first attach detaches.
    #[serde(default)]
    pub stdin_once: bool,
    /// Attach stdin.
    #[serde(default)]
    pub attach_stdin: bool,
    /// Attach stdout.
    #[serde(default)]
    pub attach_stdout: bool,
    /// Attach stderr.
    #[serde(default)]
    pub attach_stderr: bool,
    /// Host-side configuration.
    #[serde(default)]
    pub host_config: HostConfig,
}

impl CreateConfig {
    /// Force the flags needed to attach the init process's terminal.
    pub fn attach_terminal(&mut self) {
        self.tty = true;
        self.open_stdin = true;
        self.stdin_once = false;
        self.attach_stdin = true;
        self.attach_stdout = true;
        self.attach_stderr = true;
    }
}

/// Host-side part of the create body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    /// Bind mounts, `host:container[:mode]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    /// Port bindings keyed `port/proto`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    /// Privileged mode.
    #[serde(default)]
    pub privileged: bool,
    /// Network mode.
    #[serde(default)]
    pub network_mode: NetworkMode,
    /// PID namespace.
    #[serde(default)]
    pub pid_mode: NamespaceMode,
    /// IPC namespace.
    #[serde(default)]
    pub ipc_mode: NamespaceMode,
    /// UTS namespace.
    #[serde(default, rename = "UTSMode")]
    pub uts_mode: NamespaceMode,
    /// Capabilities to add.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    /// Capabilities to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_drop: Vec<String>,
    /// Restart policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    /// Devices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceMapping>,
    /// Volume sources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes_from: Vec<String>,
    /// Logging driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_config: Option<LogConfig>,
}

/// One host-side binding of a container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    /// Host address; empty for all.
    #[serde(default)]
    pub host_ip: String,
    /// Host port; empty for engine-assigned.
    #[serde(default)]
    pub host_port: String,
}

/// A device made available inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceMapping {
    /// Device on the host.
    pub path_on_host: String,
    /// Path inside the container.
    pub path_in_container: String,
    /// Cgroup permissions (`rwm` subset).
    pub cgroup_permissions: String,
}

/// Engine restart policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    /// Policy kind.
    pub name: RestartKind,
    /// Retry limit, only meaningful for `on-failure`.
    #[serde(default)]
    pub maximum_retry_count: u32,
}

/// Restart policy kinds understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartKind {
    /// Never restart.
    No,
    /// Always restart.
    Always,
    /// Restart unless explicitly stopped.
    UnlessStopped,
    /// Restart on non-zero exit.
    OnFailure,
}

/// Logging driver selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Driver name.
    #[serde(rename = "Type")]
    pub driver: String,
    /// Driver options.
    #[serde(rename = "Config", default)]
    pub options: BTreeMap<String, String>,
}

/// Network mode of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum NetworkMode {
    /// Engine default.
    #[default]
    Default,
    /// Default bridge.
    Bridge,
    /// Host network namespace.
    Host,
    /// Loopback only.
    None,
    /// Share another container's namespace.
    Container(String),
    /// A user-defined network.
    Named(String),
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Bridge => write!(f, "bridge"),
            Self::Host => write!(f, "host"),
            Self::None => write!(f, "none"),
            Self::Container(id) => write!(f, "container:{id}"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

impl From<NetworkMode> for String {
    fn from(mode: NetworkMode) -> Self {
        mode.to_string()
    }
}

impl From<String> for NetworkMode {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" | "default" => Self::Default,
            "bridge" => Self::Bridge,
            "host" => Self::Host,
            "none" => Self::None,
            _ => value.strip_prefix("container:").map_or_else(
                || Self::Named(value.clone()),
                |id| Self::Container(id.to_string()),
            ),
        }
    }
}

/// PID, IPC or UTS namespace mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum NamespaceMode {
    /// Engine default (a private namespace).
    #[default]
    Default,
    /// Host namespace.
    Host,
    /// Explicitly private (IPC only).
    Private,
    /// Private but shareable (IPC only).
    Shareable,
    /// Share another container's namespace.
    Container(String),
}

impl fmt::Display for NamespaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => Ok(()),
            Self::Host => write!(f, "host"),
            Self::Private => write!(f, "private"),
            Self::Shareable => write!(f, "shareable"),
            Self::Container(id) => write!(f, "container:{id}"),
        }
    }
}

impl From<NamespaceMode> for String {
    fn from(mode: NamespaceMode) -> Self {
        mode.to_string()
    }
}

impl TryFrom<String> for NamespaceMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "" => Ok(Self::Default),
            "host" => Ok(Self::Host),
            "private" => Ok(Self::Private),
            "shareable" => Ok(Self::Shareable),
            _ => match value.strip_prefix("container:") {
                Some(id) if !id.is_empty() => Ok(Self::Container(id.to_string())),
                _ => Err(format!("unknown namespace mode '{value}'")),
            },
        }
    }
}
