//! Live console switching (`bockos console switch|list`).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bockos_common::{BockOsError, BockOsResult};
use bockos_config::{CONSOLE_SLOT, Config, ConfigStore, ContainerSpec, DEFAULT_CONSOLE};
use bockos_engine::{Engine, LifecycleManager, StartOutcome};

/// The container definitions a switch works on, keyed by id.
#[derive(Debug, Default)]
pub struct Project {
    services: BTreeMap<String, ContainerSpec>,
}

impl Project {
    /// Project holding the configured system containers.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let services = config
            .system_containers
            .iter()
            .map(|spec| (spec.id.clone(), spec.clone()))
            .collect();
        Self { services }
    }

    /// Add or replace a definition.
    pub fn register(&mut self, spec: ContainerSpec) {
        self.services.insert(spec.id.clone(), spec);
    }

    /// Definition for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ContainerSpec> {
        self.services.get(id)
    }

    /// Ids whose definition was replaced by a placeholder, sorted.
    #[must_use]
    pub fn vacated(&self) -> Vec<&str> {
        self.services
            .values()
            .filter(|spec| spec.image.is_empty())
            .map(|spec| spec.id.as_str())
            .collect()
    }
}

/// Remove the containers of vacated console definitions.
async fn retire(engine: &dyn Engine, ids: &[&str]) -> BockOsResult<()> {
    for id in ids {
        let Some(existing) = engine.inspect_container(id).await? else {
            continue;
        };
        tracing::info!(console = %id, engine_id = %existing.id, "Removing previous console");
        engine.remove_container(&existing.id).await?;
    }
    Ok(())
}

/// Check that exactly one id was given.
///
/// # Errors
///
/// Returns [`BockOsError::Usage`] for any other number of arguments.
pub fn single_id(ids: &[String]) -> BockOsResult<&str> {
    match ids {
        [id] => Ok(id),
        _ => Err(BockOsError::Usage {
            message: format!(
                "console switch takes exactly one console id, got {}",
                ids.len()
            ),
        }),
    }
}

/// Switch the active console to `id`.
///
/// A named console takes over from the previous one: the console slot and the
/// previously selected service are vacated and their containers removed
/// before the new service is brought up. Persisting the selection and
/// restarting the engine container are best effort; loading, replacing or
/// starting a named console is not.
///
/// # Errors
///
/// Returns an error if the console is unknown or fails to start.
pub async fn switch(store: &ConfigStore, engine: Arc<dyn Engine>, id: &str) -> BockOsResult<()> {
    let config = store.config();
    tracing::info!(console = %id, "Switching console");

    let mut project = Project::from_config(&config);
    let target = if id == DEFAULT_CONSOLE {
        None
    } else {
        project.register(ContainerSpec::placeholder(CONSOLE_SLOT));
        let previous = config.console_id();
        if previous != CONSOLE_SLOT {
            project.register(ContainerSpec::placeholder(previous));
        }
        project.register(config.find_service(id, &store.paths().services_dir())?);
        Some(id)
    };

    if let Err(e) = store.set("console", id) {
        tracing::warn!(console = %id, error = %e, "Failed to persist console selection");
    }

    if let Some(spec) = target.and_then(|id| project.get(id)) {
        retire(engine.as_ref(), &project.vacated()).await?;
        let lifecycle = LifecycleManager::new(Arc::clone(&engine), &config.state_dir)
            .with_console(&spec.id, false);
        match lifecycle.start_and_wait(spec).await {
            StartOutcome::Launched(handle) => {
                let handle = handle.into_result()?;
                tracing::info!(console = %handle.id, state = %handle.state, "Console started");
            }
            StartOutcome::Disabled { id } => {
                tracing::warn!(console = %id, "Console is disabled");
            }
        }
    }

    let timeout = Duration::from_secs(config.engine.restart_timeout);
    if let Err(e) = engine
        .restart_container(&config.engine.container, timeout)
        .await
    {
        tracing::warn!(
            container = %config.engine.container,
            error = %e,
            "Failed to restart engine container"
        );
    }
    Ok(())
}

/// Console names that can be switched to: `default`, the catalog and
/// `<services_dir>/*.yml`, sorted.
#[must_use]
pub fn available_consoles(config: &Config, services_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::iter::once(DEFAULT_CONSOLE.to_string())
        .chain(config.services.keys().cloned())
        .collect();

    if let Ok(entries) = std::fs::read_dir(services_dir) {
        names.extend(entries.filter_map(Result::ok).filter_map(|entry| {
            let path = entry.path();
            (path.extension()? == "yml")
                .then(|| path.file_stem()?.to_str().map(str::to_string))
                .flatten()
        }));
    }

    names.sort();
    names.dedup();
    names
}

/// Render the console list, marking the selected one with `*`.
#[must_use]
pub fn render_list(names: &[String], selected: &str) -> String {
    names
        .iter()
        .map(|name| {
            let mark = if name == selected { '*' } else { ' ' };
            format!("{mark} {name}\n")
        })
        .collect()
}
