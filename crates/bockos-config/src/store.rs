//! Configuration store: load, merge, read and persist.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use bockos_common::{BockOsError, BockOsResult, OsPaths};
use parking_lot::Mutex;
use serde_yaml::Value;

use crate::document::{Config, DEFAULTS_YAML};
use crate::merge::{env_overrides, get_path, merge, parse_value, set_path};

/// The four configuration layers, lowest precedence first.
#[derive(Debug, Clone)]
struct Layers {
    defaults: Value,
    persisted: Value,
    metadata: Value,
    environment: Value,
}

impl Layers {
    fn merged(&self) -> Value {
        let mut doc = self.defaults.clone();
        merge(&mut doc, self.persisted.clone());
        merge(&mut doc, self.metadata.clone());
        merge(&mut doc, self.environment.clone());
        doc
    }
}

#[derive(Debug)]
struct StoreState {
    layers: Layers,
    merged: Value,
    config: Arc<Config>,
}

/// Owner of the merged configuration.
///
/// Constructed once per process and passed by reference. Readers take a
/// cheap [`Arc`] snapshot with [`ConfigStore::config`]; writers go through
/// [`ConfigStore::set`], which holds the store lock for the whole
/// read-modify-persist cycle.
#[derive(Debug)]
pub struct ConfigStore {
    paths: OsPaths,
    state: Mutex<StoreState>,
}

impl ConfigStore {
    /// Load all layers, taking overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`BockOsError::ConfigParse`] if the persisted file is corrupt
    /// or the merged document is invalid.
    pub fn load(paths: OsPaths) -> BockOsResult<Self> {
        Self::load_with_env(paths, std::env::vars())
    }

    /// Load all layers with an explicit environment.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::load`].
    pub fn load_with_env<I>(paths: OsPaths, env: I) -> BockOsResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let layers = Layers {
            defaults: defaults_layer()?,
            persisted: read_persisted(&paths.persisted_config())?,
            metadata: read_metadata(&paths.cloud_config()),
            environment: env_overrides(env),
        };
        Self::from_layers(paths, layers)
    }

    /// Load like [`ConfigStore::load_with_env`], falling back to defaults
    /// instead of failing on a corrupt document.
    ///
    /// # Errors
    ///
    /// Only I/O errors other than "not found" are returned.
    pub fn load_or_defaults<I>(paths: OsPaths, env: I) -> BockOsResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let persisted = match read_persisted(&paths.persisted_config()) {
            Ok(value) => value,
            Err(err @ BockOsError::ConfigParse { .. }) => {
                tracing::error!(error = %err, "Ignoring corrupt persisted configuration");
                Value::Null
            }
            Err(err) => return Err(err),
        };

        let layers = Layers {
            defaults: defaults_layer()?,
            persisted,
            metadata: read_metadata(&paths.cloud_config()),
            environment: env_overrides(env),
        };

        match Self::from_layers(paths.clone(), layers.clone()) {
            Ok(store) => Ok(store),
            Err(err @ BockOsError::ConfigParse { .. }) => {
                tracing::error!(error = %err, "Merged configuration invalid, using defaults");
                Self::from_layers(
                    paths,
                    Layers {
                        defaults: layers.defaults,
                        persisted: Value::Null,
                        metadata: Value::Null,
                        environment: Value::Null,
                    },
                )
            }
            Err(err) => Err(err),
        }
    }

    fn from_layers(paths: OsPaths, layers: Layers) -> BockOsResult<Self> {
        let merged = layers.merged();
        let config = Arc::new(decode(&merged)?);
        tracing::debug!(rescue = config.rescue, console = %config.console, "Configuration loaded");

        Ok(Self {
            paths,
            state: Mutex::new(StoreState {
                layers,
                merged,
                config,
            }),
        })
    }

    /// Paths this store reads from and writes to.
    #[must_use]
    pub const fn paths(&self) -> &OsPaths {
        &self.paths
    }

    /// Snapshot of the merged configuration.
    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.state.lock().config)
    }

    /// Read a dotted key from the merged document.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        get_path(&self.state.lock().merged, key).cloned()
    }

    /// Set a dotted key from its textual form and persist.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::set_value`].
    pub fn set(&self, key: &str, raw: &str) -> BockOsResult<()> {
        self.set_value(key, parse_value(raw))
    }

    /// Set a dotted key and persist the persisted layer.
    ///
    /// The new document is validated before anything is written; the file
    /// is replaced atomically. Concurrent callers are serialized.
    ///
    /// # Errors
    ///
    /// Returns [`BockOsError::Config`] if the value makes the document
    /// invalid, or an I/O error if persisting fails. In both cases the
    /// in-memory configuration is unchanged.
    pub fn set_value(&self, key: &str, value: Value) -> BockOsResult<()> {
        if key.is_empty() {
            return Err(BockOsError::config("empty configuration key"));
        }

        let mut state = self.state.lock();

        let mut layers = state.layers.clone();
        set_path(&mut layers.persisted, key, value.clone());
        // The environment layer would mask the new value until next boot.
        if get_path(&layers.environment, key).is_some() {
            set_path(&mut layers.environment, key, value);
        }

        let merged = layers.merged();
        let config = decode(&merged).map_err(|e| {
            BockOsError::config(format!("invalid value for '{key}': {e}"))
        })?;

        write_atomic(&self.paths.persisted_config(), &layers.persisted)?;
        tracing::info!(%key, path = %self.paths.persisted_config().display(), "Configuration updated");

        state.layers = layers;
        state.merged = merged;
        state.config = Arc::new(config);
        Ok(())
    }
}

fn defaults_layer() -> BockOsResult<Value> {
    serde_yaml::from_str(DEFAULTS_YAML).map_err(|e| BockOsError::ConfigParse {
        path: "<defaults>".to_string(),
        message: e.to_string(),
    })
}

fn decode(merged: &Value) -> BockOsResult<Config> {
    serde_yaml::from_value(merged.clone()).map_err(|e| BockOsError::ConfigParse {
        path: "<merged>".to_string(),
        message: e.to_string(),
    })
}

fn read_persisted(path: &Path) -> BockOsResult<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Value::Null),
        Err(e) => return Err(e.into()),
    };

    let value: Value = serde_yaml::from_str(&content).map_err(|e| BockOsError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    if value.is_null() || value.is_mapping() {
        Ok(value)
    } else {
        Err(BockOsError::ConfigParse {
            path: path.display().to_string(),
            message: "top level must be a mapping".to_string(),
        })
    }
}

fn read_metadata(path: &Path) -> Value {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Value::Null,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read cloud metadata");
            return Value::Null;
        }
    };

    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) if value.is_mapping() => value,
        Ok(Value::Null) => Value::Null,
        Ok(_) => {
            tracing::warn!(path = %path.display(), "Cloud metadata is not a mapping, ignoring");
            Value::Null
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Corrupt cloud metadata, ignoring");
            Value::Null
        }
    }
}

fn write_atomic(path: &Path, doc: &Value) -> BockOsResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| BockOsError::config(format!("no parent for {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let content = serde_yaml::to_string(doc)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| BockOsError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Vec<(String, String)> {
        Vec::new()
    }

    #[test]
    fn defaults_when_nothing_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let store = ConfigStore::load_with_env(OsPaths::with_root(temp.path()), no_env()).unwrap();
        assert_eq!(*store.config(), Config::defaults().unwrap());
    }

    #[test]
    fn layers_apply_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let paths = OsPaths::with_root(temp.path());
        paths.create_dirs().unwrap();
        std::fs::write(
            paths.persisted_config(),
            "console: alpine\nhost: {hostname: persisted}\nengine: {variant: persisted}\n",
        )
        .unwrap();
        std::fs::write(
            paths.cloud_config(),
            "host: {hostname: cloud}\nengine: {variant: cloud}\n",
        )
        .unwrap();

        let env = vec![("BOCKOS_ENGINE__VARIANT".to_string(), "env".to_string())];
        let config = ConfigStore::load_with_env(paths, env).unwrap().config();

        assert_eq!(config.console, "alpine");
        assert_eq!(config.host.hostname, "cloud");
        assert_eq!(config.engine.variant, "env");
        assert_eq!(config.engine.container, "docker");
    }

    #[test]
    fn corrupt_persisted_file_is_a_parse_error() {
        let temp = tempfile::tempdir().unwrap();
        let paths = OsPaths::with_root(temp.path());
        paths.create_dirs().unwrap();
        std::fs::write(paths.persisted_config(), "console: [unclosed\n").unwrap();

        let err = ConfigStore::load_with_env(paths.clone(), no_env()).unwrap_err();
        assert!(matches!(err, BockOsError::ConfigParse { .. }));

        let store = ConfigStore::load_or_defaults(paths, no_env()).unwrap();
        assert_eq!(store.config().console, "default");
    }

    #[test]
    fn corrupt_metadata_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let paths = OsPaths::with_root(temp.path());
        paths.create_dirs().unwrap();
        std::fs::write(paths.cloud_config(), ":: not yaml [").unwrap();

        let store = ConfigStore::load_with_env(paths, no_env()).unwrap();
        assert_eq!(store.config().host.hostname, "bockos");
    }

    #[test]
    fn invalid_merged_value_falls_back_to_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let paths = OsPaths::with_root(temp.path());
        let env = vec![("BOCKOS_RESCUE".to_string(), "[not, a, bool]".to_string())];

        assert!(ConfigStore::load_with_env(paths.clone(), env.clone()).is_err());
        let store = ConfigStore::load_or_defaults(paths, env).unwrap();
        assert!(!store.config().rescue);
    }

    #[test]
    fn set_persists_and_reloads() {
        let temp = tempfile::tempdir().unwrap();
        let paths = OsPaths::with_root(temp.path());
        let store = ConfigStore::load_with_env(paths.clone(), no_env()).unwrap();

        store.set("console", "alpine").unwrap();
        store.set("engine.restart_timeout", "3").unwrap();
        assert_eq!(store.config().console, "alpine");
        assert_eq!(store.get("engine.restart_timeout"), Some(Value::from(3)));

        let reloaded = ConfigStore::load_with_env(paths.clone(), no_env()).unwrap();
        assert_eq!(reloaded.config().console, "alpine");
        assert_eq!(reloaded.config().engine.restart_timeout, 3);

        // Only the persisted layer is written, not the merged defaults.
        let on_disk = std::fs::read_to_string(paths.persisted_config()).unwrap();
        assert!(!on_disk.contains("system_containers"));
    }

    #[test]
    fn set_rejects_invalid_value_without_writing() {
        let temp = tempfile::tempdir().unwrap();
        let paths = OsPaths::with_root(temp.path());
        let store = ConfigStore::load_with_env(paths.clone(), no_env()).unwrap();

        let err = store.set("rescue", "[1, 2]").unwrap_err();
        assert!(matches!(err, BockOsError::Config { .. }));
        assert!(!store.config().rescue);
        assert!(!paths.persisted_config().exists());
    }

    #[test]
    fn concurrent_sets_are_serialized() {
        let temp = tempfile::tempdir().unwrap();
        let paths = OsPaths::with_root(temp.path());
        let store = Arc::new(ConfigStore::load_with_env(paths.clone(), no_env()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.set(&format!("network.slot{i}"), &i.to_string()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reloaded = ConfigStore::load_with_env(paths, no_env()).unwrap();
        for i in 0..8 {
            assert_eq!(
                reloaded.get(&format!("network.slot{i}")),
                Some(Value::from(i))
            );
        }
    }
}
