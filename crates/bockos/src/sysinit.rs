//! System-init: the ordered boot phases run against the system engine.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bockos_common::BockOsResult;
use bockos_config::{Config, ConfigStore, ContainerSpec, InitFunc, run_init_funcs};
use bockos_engine::images::load_archives;
use bockos_engine::{Engine, LifecycleManager, StartOutcome, wait_for_engine};

/// Delay between engine pings while waiting for it to come up.
pub const PING_INTERVAL: Duration = Duration::from_millis(500);

/// Load bundled image archives that are not stamped yet.
pub struct LoadImages {
    engine: Arc<dyn Engine>,
}

impl LoadImages {
    /// Phase loading into `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl InitFunc for LoadImages {
    fn name(&self) -> &str {
        "load-images"
    }

    async fn run(&self, config: &Config) -> BockOsResult<()> {
        let archives = config.image_archives()?;
        let loaded = load_archives(self.engine.as_ref(), &archives, &config.state_dir).await?;
        tracing::info!(found = archives.len(), loaded, "Image archives processed");
        Ok(())
    }
}

/// Start every boot container in order.
pub struct RunContainers {
    engine: Arc<dyn Engine>,
    tty: bool,
}

impl RunContainers {
    /// Phase starting containers on `engine`; `tty` enables console attach.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, tty: bool) -> Self {
        Self { engine, tty }
    }
}

/// Lifecycle manager configured for a boot of `config`.
///
/// Rescue mode attaches to the rescue container and ignores the disable list.
#[must_use]
pub fn lifecycle_for(config: &Config, engine: Arc<dyn Engine>, tty: bool) -> LifecycleManager {
    let (disabled, console_id) = if config.rescue {
        (BTreeSet::new(), config.rescue_container.id.as_str())
    } else {
        (config.disable.clone(), config.console_id())
    };
    LifecycleManager::new(engine, &config.state_dir)
        .with_disabled(disabled)
        .with_console(console_id, tty)
}

/// Launch `specs` one at a time. Individual failures do not stop the loop.
pub async fn run_containers(lifecycle: &LifecycleManager, specs: &[ContainerSpec]) -> Vec<StartOutcome> {
    let mut outcomes = Vec::with_capacity(specs.len());
    for spec in specs {
        outcomes.push(lifecycle.start_and_wait(spec).await);
    }
    outcomes
}

#[async_trait]
impl InitFunc for RunContainers {
    fn name(&self) -> &str {
        "run-containers"
    }

    async fn run(&self, config: &Config) -> BockOsResult<()> {
        if config.rescue {
            tracing::warn!("Rescue mode, starting only the rescue container");
        }
        let lifecycle = lifecycle_for(config, Arc::clone(&self.engine), self.tty);
        let outcomes = run_containers(&lifecycle, &config.boot_containers()).await;

        let failed: Vec<&str> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                StartOutcome::Launched(handle) if !handle.is_ok() => Some(handle.id.as_str()),
                _ => None,
            })
            .collect();
        let disabled = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, StartOutcome::Disabled { .. }))
            .count();

        if failed.is_empty() {
            tracing::info!(total = outcomes.len(), disabled, "System containers launched");
        } else {
            tracing::warn!(total = outcomes.len(), disabled, ?failed, "Some system containers failed");
        }
        Ok(())
    }
}

/// Flush filesystem buffers.
pub struct SyncFilesystems;

#[async_trait]
impl InitFunc for SyncFilesystems {
    fn name(&self) -> &str {
        "sync"
    }

    async fn run(&self, _config: &Config) -> BockOsResult<()> {
        rustix::fs::sync();
        Ok(())
    }
}

/// The boot phases, in order.
#[must_use]
pub fn init_funcs(engine: &Arc<dyn Engine>, tty: bool) -> Vec<Box<dyn InitFunc>> {
    vec![
        Box::new(LoadImages::new(Arc::clone(engine))),
        Box::new(RunContainers::new(Arc::clone(engine), tty)),
        Box::new(SyncFilesystems),
    ]
}

/// Wait for the engine, then run every boot phase.
///
/// # Errors
///
/// Returns an error if the engine never answers or a phase fails.
pub async fn run(store: &ConfigStore, engine: Arc<dyn Engine>, tty: bool) -> BockOsResult<()> {
    let config = store.config();
    wait_for_engine(engine.as_ref(), config.system_engine.ping_attempts, PING_INTERVAL).await?;
    run_init_funcs(&config, &init_funcs(&engine, tty)).await
}
