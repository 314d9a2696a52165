//! Declarative spec to engine-native configuration.
//!
//! Everything here is a pure function of its input: no engine calls, no
//! filesystem access. A malformed field fails the conversion of that one
//! container with [`BockOsError::SpecParse`].

use std::collections::BTreeMap;

use bockos_common::{BockOsError, BockOsResult};
use bockos_config::ContainerSpec;
use sha2::{Digest, Sha256};

use crate::types::{
    CreateConfig, DeviceMapping, Empty, HostConfig, LogConfig, NamespaceMode, NetworkMode,
    PortBinding, RestartKind, RestartPolicy,
};

/// A mount entry after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeKind {
    /// `host:container[:mode]`, passed as a bind.
    Bind(String),
    /// A container path backed by an anonymous volume.
    Volume(String),
}

/// Classify a mount entry: anything containing `:` is a bind.
#[must_use]
pub fn classify_volume(entry: &str) -> VolumeKind {
    if entry.contains(':') {
        VolumeKind::Bind(entry.to_string())
    } else {
        VolumeKind::Volume(entry.to_string())
    }
}

/// Split `KEY=VALUE` on the first `=`; a bare key maps to `""`.
#[must_use]
pub fn split_kv(entry: &str) -> (String, String) {
    match entry.split_once('=') {
        Some((key, value)) => (key.to_string(), value.to_string()),
        None => (entry.to_string(), String::new()),
    }
}

/// Build a map from `KEY=VALUE` entries; later entries win.
#[must_use]
pub fn kv_map(entries: &[String]) -> BTreeMap<String, String> {
    entries.iter().map(|entry| split_kv(entry)).collect()
}

/// A parsed `ports` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Exposed key, `port/proto`.
    pub key: String,
    /// Host side of the binding.
    pub binding: PortBinding,
}

fn spec_error(id: &str, field: &'static str, value: &str, reason: impl Into<String>) -> BockOsError {
    BockOsError::SpecParse {
        id: id.to_string(),
        field,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Parse a container port with optional protocol into `port/proto`.
fn exposed_key(id: &str, field: &'static str, raw: &str, value: &str) -> BockOsResult<String> {
    let (port, proto) = value.split_once('/').unwrap_or((value, "tcp"));
    if !matches!(proto, "tcp" | "udp" | "sctp") {
        return Err(spec_error(id, field, raw, format!("unknown protocol '{proto}'")));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(spec_error(id, field, raw, format!("invalid port '{port}'"))),
        Ok(port) => Ok(format!("{port}/{proto}")),
    }
}

/// Parse `[ip:][host:]container[/proto]`.
///
/// # Errors
///
/// Returns [`BockOsError::SpecParse`] for non-numeric ports, unknown
/// protocols or too many components.
pub fn parse_port(id: &str, raw: &str) -> BockOsResult<PortSpec> {
    let parts: Vec<&str> = raw.split(':').collect();
    let (host_ip, host_port, container) = match parts.as_slice() {
        [container] => ("", "", *container),
        [host, container] => ("", *host, *container),
        [ip, host, container] => (*ip, *host, *container),
        _ => return Err(spec_error(id, "port", raw, "too many ':' separated parts")),
    };

    if !host_port.is_empty() && host_port.parse::<u16>().is_err() {
        return Err(spec_error(id, "port", raw, format!("invalid host port '{host_port}'")));
    }
    if parts.len() == 3 && host_ip.is_empty() && host_port.is_empty() {
        return Err(spec_error(id, "port", raw, "empty host address and port"));
    }

    Ok(PortSpec {
        key: exposed_key(id, "port", raw, container)?,
        binding: PortBinding {
            host_ip: host_ip.to_string(),
            host_port: host_port.to_string(),
        },
    })
}

/// Parse `host[:container[:perms]]`.
///
/// # Errors
///
/// Returns [`BockOsError::SpecParse`] for relative paths, bad permissions
/// or too many components.
pub fn parse_device(id: &str, raw: &str) -> BockOsResult<DeviceMapping> {
    let parts: Vec<&str> = raw.split(':').collect();
    let (host, container, perms) = match parts.as_slice() {
        [host] => (*host, *host, "rwm"),
        [host, container] => (*host, *container, "rwm"),
        [host, container, perms] => (*host, *container, *perms),
        _ => return Err(spec_error(id, "device", raw, "too many ':' separated parts")),
    };

    if !host.starts_with('/') || !container.starts_with('/') {
        return Err(spec_error(id, "device", raw, "device paths must be absolute"));
    }
    if perms.is_empty() || !perms.chars().all(|c| matches!(c, 'r' | 'w' | 'm')) {
        return Err(spec_error(id, "device", raw, format!("invalid permissions '{perms}'")));
    }

    Ok(DeviceMapping {
        path_on_host: host.to_string(),
        path_in_container: container.to_string(),
        cgroup_permissions: perms.to_string(),
    })
}

/// Parse `no`, `always`, `unless-stopped` or `on-failure[:N]`.
///
/// # Errors
///
/// Returns [`BockOsError::SpecParse`] for unknown policies.
pub fn parse_restart(id: &str, raw: &str) -> BockOsResult<Option<RestartPolicy>> {
    let (name, count) = raw.split_once(':').unwrap_or((raw, ""));
    let kind = match name {
        "" => return Ok(None),
        "no" => RestartKind::No,
        "always" => RestartKind::Always,
        "unless-stopped" => RestartKind::UnlessStopped,
        "on-failure" => RestartKind::OnFailure,
        _ => return Err(spec_error(id, "restart", raw, "unknown restart policy")),
    };

    let maximum_retry_count = match (kind, count) {
        (_, "") => 0,
        (RestartKind::OnFailure, count) => count
            .parse()
            .map_err(|_| spec_error(id, "restart", raw, "invalid retry count"))?,
        _ => return Err(spec_error(id, "restart", raw, "only on-failure takes a retry count")),
    };

    Ok(Some(RestartPolicy {
        name: kind,
        maximum_retry_count,
    }))
}

/// Parse a `pid`, `ipc` or `uts` mode, rejecting modes the namespace lacks.
///
/// # Errors
///
/// Returns [`BockOsError::SpecParse`] for unknown or unsupported modes.
pub fn parse_namespace(id: &str, field: &'static str, raw: &str) -> BockOsResult<NamespaceMode> {
    let mode = NamespaceMode::try_from(raw.to_string())
        .map_err(|reason| spec_error(id, field, raw, reason))?;

    let supported = match (field, &mode) {
        (_, NamespaceMode::Default | NamespaceMode::Host) => true,
        ("pid" | "ipc", NamespaceMode::Container(_)) => true,
        ("ipc", NamespaceMode::Private | NamespaceMode::Shareable) => true,
        _ => false,
    };
    if supported {
        Ok(mode)
    } else {
        Err(spec_error(id, field, raw, format!("mode not supported for {field}")))
    }
}

/// Parse the `net` mode.
///
/// # Errors
///
/// Returns [`BockOsError::SpecParse`] for `container:` without an id.
pub fn parse_network(id: &str, raw: &str) -> BockOsResult<NetworkMode> {
    match NetworkMode::from(raw.to_string()) {
        NetworkMode::Container(target) if target.is_empty() => {
            Err(spec_error(id, "net", raw, "missing container id"))
        }
        mode => Ok(mode),
    }
}

/// Convert a spec into the engine's create body.
///
/// # Errors
///
/// Returns the first [`BockOsError::SpecParse`] found, including empty
/// volume entries.
pub fn convert(spec: &ContainerSpec) -> BockOsResult<CreateConfig> {
    let id = spec.id.as_str();

    let mut volumes = BTreeMap::new();
    let mut binds = Vec::new();
    for entry in &spec.volumes {
        match classify_volume(entry) {
            VolumeKind::Bind(bind) => binds.push(bind),
            VolumeKind::Volume(path) if path.is_empty() => {
                return Err(spec_error(id, "volume", entry, "empty volume entry"));
            }
            VolumeKind::Volume(path) => {
                volumes.insert(path, Empty {});
            }
        }
    }

    let mut exposed_ports = BTreeMap::new();
    let mut port_bindings: BTreeMap<String, Vec<PortBinding>> = BTreeMap::new();
    for raw in &spec.ports {
        let port = parse_port(id, raw)?;
        exposed_ports.insert(port.key.clone(), Empty {});
        port_bindings.entry(port.key).or_default().push(port.binding);
    }
    for raw in &spec.expose {
        exposed_ports.insert(exposed_key(id, "expose", raw, raw)?, Empty {});
    }

    let devices = spec
        .devices
        .iter()
        .map(|raw| parse_device(id, raw))
        .collect::<BockOsResult<Vec<_>>>()?;

    let env = kv_map(&spec.environment)
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();

    let log_config = (!spec.log_driver.is_empty()).then(|| LogConfig {
        driver: spec.log_driver.clone(),
        options: BTreeMap::new(),
    });

    Ok(CreateConfig {
        image: spec.image.clone(),
        cmd: spec.command.clone(),
        entrypoint: spec.entrypoint.clone(),
        env,
        labels: kv_map(&spec.labels),
        exposed_ports,
        volumes,
        working_dir: spec.working_dir.clone(),
        user: spec.user.clone(),
        tty: spec.tty,
        open_stdin: spec.stdin_open,
        stdin_once: false,
        attach_stdin: false,
        attach_stdout: false,
        attach_stderr: false,
        host_config: HostConfig {
            binds,
            port_bindings,
            privileged: spec.privileged,
            network_mode: parse_network(id, &spec.net)?,
            pid_mode: parse_namespace(id, "pid", &spec.pid)?,
            ipc_mode: parse_namespace(id, "ipc", &spec.ipc)?,
            uts_mode: parse_namespace(id, "uts", &spec.uts)?,
            cap_add: spec.cap_add.clone(),
            cap_drop: spec.cap_drop.clone(),
            restart_policy: parse_restart(id, &spec.restart)?,
            devices,
            volumes_from: spec.volumes_from.clone(),
            log_config,
        },
    })
}

/// Label carrying the hash of the create body a container was built from.
pub const CONFIG_HASH_LABEL: &str = "io.bockos.config-hash";

/// SHA-256 of the JSON create body, hex encoded.
///
/// # Errors
///
/// Returns [`BockOsError::Serialization`] if the body cannot be encoded.
pub fn config_hash(config: &CreateConfig) -> BockOsResult<String> {
    let body = serde_json::to_vec(config)?;
    Ok(hex::encode(Sha256::digest(&body)))
}

/// Expand `$NAME`, `${NAME}` and `$$` in `input` using `lookup`.
///
/// Unknown names expand to the empty string.
pub fn expand<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String> + ?Sized,
{
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                out.push_str(&lookup(&name).unwrap_or_default());
            }
            Some(&c) if c == '_' || c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '_' || c.is_ascii_alphanumeric() {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&lookup(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }
    out
}

/// Return a copy of `spec` with variables substituted.
///
/// Image, command, entrypoint, environment, labels and volumes are expanded.
/// Bare environment keys are completed from `lookup` when it has a value.
#[must_use]
pub fn substitute<F>(spec: &ContainerSpec, lookup: &F) -> ContainerSpec
where
    F: Fn(&str) -> Option<String> + ?Sized,
{
    let expand_all = |values: &[String]| -> Vec<String> {
        values.iter().map(|v| expand(v, lookup)).collect()
    };

    let environment = spec
        .environment
        .iter()
        .map(|entry| {
            if entry.contains('=') {
                expand(entry, lookup)
            } else {
                lookup(entry).map_or_else(|| entry.clone(), |value| format!("{entry}={value}"))
            }
        })
        .collect();

    ContainerSpec {
        image: expand(&spec.image, lookup),
        command: expand_all(&spec.command),
        entrypoint: expand_all(&spec.entrypoint),
        environment,
        labels: expand_all(&spec.labels),
        volumes: expand_all(&spec.volumes),
        ..spec.clone()
    }
}
