//! One system container from image import to exit.
//!
//! [`LifecycleManager::start_and_wait`] never returns an error: failures of a
//! single container are recorded on its [`ContainerHandle`] so the caller can
//! keep booting the rest.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bockos_common::paths::stamp_path;
use bockos_common::{BockOsError, BockOsResult};
use bockos_config::ContainerSpec;

use crate::client::Engine;
use crate::convert::{CONFIG_HASH_LABEL, config_hash, convert, substitute};
use crate::reference::ImageRef;

/// Variable lookup used for spec substitution.
pub type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Progress of a container through the boot sequence. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Nothing done yet.
    Absent,
    /// Image archive imported.
    Imported,
    /// Container exists in the engine.
    Created,
    /// Start accepted by the engine.
    Started,
    /// Running detached.
    Running,
    /// Attached run finished.
    Exited,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Imported => "imported",
            Self::Created => "created",
            Self::Started => "started",
            Self::Running => "running",
            Self::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// Outcome of launching one container.
#[derive(Debug)]
pub struct ContainerHandle {
    /// Spec id.
    pub id: String,
    /// Engine container id once created or found.
    pub engine_id: Option<String>,
    /// Furthest state reached.
    pub state: LifecycleState,
    /// Whether this process's terminal was attached.
    pub attached: bool,
    /// Exit code of an attached run.
    pub exit_code: Option<i64>,
    /// The failure that stopped the launch, if any.
    pub last_error: Option<BockOsError>,
}

impl ContainerHandle {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            engine_id: None,
            state: LifecycleState::Absent,
            attached: false,
            exit_code: None,
            last_error: None,
        }
    }

    fn advance(&mut self, next: LifecycleState) {
        debug_assert!(next >= self.state, "{} -> {next}", self.state);
        if next > self.state {
            tracing::debug!(container = %self.id, from = %self.state, to = %next, "State change");
            self.state = next;
        }
    }

    /// Whether the launch completed without error.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.last_error.is_none()
    }

    /// Turn a recorded failure back into an error.
    ///
    /// # Errors
    ///
    /// Returns the captured error, if any.
    pub fn into_result(mut self) -> BockOsResult<Self> {
        match self.last_error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// Result of [`LifecycleManager::start_and_wait`].
#[derive(Debug)]
pub enum StartOutcome {
    /// Skipped because the id is on the disable list.
    Disabled {
        /// Spec id.
        id: String,
    },
    /// Launch attempted; inspect the handle for the result.
    Launched(ContainerHandle),
}

impl StartOutcome {
    /// Spec id of the container.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Disabled { id } => id,
            Self::Launched(handle) => &handle.id,
        }
    }
}

/// Whether this process's stdin is a terminal.
#[must_use]
pub fn stdin_is_tty() -> bool {
    rustix::termios::isatty(std::io::stdin())
}

/// Drives containers through import, create, start and (optionally) wait.
#[derive(Clone)]
pub struct LifecycleManager {
    engine: Arc<dyn Engine>,
    state_dir: PathBuf,
    disabled: BTreeSet<String>,
    console_id: String,
    tty: bool,
    lookup: Lookup,
}

impl fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("state_dir", &self.state_dir)
            .field("disabled", &self.disabled)
            .field("console_id", &self.console_id)
            .field("tty", &self.tty)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    /// Manager with nothing disabled, no console attach and process
    /// environment lookup.
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, state_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            state_dir: state_dir.into(),
            disabled: BTreeSet::new(),
            console_id: String::new(),
            tty: false,
            lookup: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Skip these ids.
    #[must_use]
    pub fn with_disabled(mut self, disabled: BTreeSet<String>) -> Self {
        self.disabled = disabled;
        self
    }

    /// Attach to `console_id` when `tty` is set.
    #[must_use]
    pub fn with_console(mut self, console_id: impl Into<String>, tty: bool) -> Self {
        self.console_id = console_id.into();
        self.tty = tty;
        self
    }

    /// Replace the substitution lookup.
    #[must_use]
    pub fn with_lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = lookup;
        self
    }

    /// The engine this manager drives.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Launch `spec`, waiting for it only when its terminal is attached.
    pub async fn start_and_wait(&self, spec: &ContainerSpec) -> StartOutcome {
        if self.disabled.contains(&spec.id) {
            tracing::info!(container = %spec.id, "Container disabled, skipping");
            return StartOutcome::Disabled {
                id: spec.id.clone(),
            };
        }

        let mut handle = ContainerHandle::new(&spec.id);
        match self.launch(spec, &mut handle).await {
            Ok(()) => {
                tracing::info!(container = %spec.id, state = %handle.state, "Container launched");
            }
            Err(e) => {
                tracing::error!(
                    container = %spec.id,
                    state = %handle.state,
                    error = %e,
                    "Container failed"
                );
                handle.last_error = Some(e);
            }
        }
        StartOutcome::Launched(handle)
    }

    async fn launch(&self, spec: &ContainerSpec, handle: &mut ContainerHandle) -> BockOsResult<()> {
        let spec = substitute(spec, self.lookup.as_ref());

        if let Some(archive) = &spec.import {
            self.import_once(&spec, archive).await?;
            handle.advance(LifecycleState::Imported);
        }

        let mut config = convert(&spec)?;
        let attach = self.tty && !self.console_id.is_empty() && spec.id == self.console_id;
        if attach {
            config.attach_terminal();
        }
        let hash = config_hash(&config)?;
        config
            .labels
            .insert(CONFIG_HASH_LABEL.to_string(), hash.clone());

        let engine_id = match self.engine.inspect_container(&spec.id).await? {
            Some(existing) if existing.labels.get(CONFIG_HASH_LABEL) == Some(&hash) => {
                tracing::debug!(container = %spec.id, engine_id = %existing.id, "Reusing container");
                existing.id
            }
            Some(existing) => {
                tracing::info!(
                    container = %spec.id,
                    engine_id = %existing.id,
                    "Definition changed, recreating container"
                );
                self.engine.remove_container(&existing.id).await?;
                self.engine.create_container(&spec.id, &config).await?
            }
            None => self.engine.create_container(&spec.id, &config).await?,
        };
        handle.engine_id = Some(engine_id.clone());
        handle.advance(LifecycleState::Created);

        let attachment = if attach {
            let attachment = self.engine.attach_container(&engine_id).await?;
            handle.attached = true;
            Some(attachment)
        } else {
            None
        };

        self.engine.start_container(&engine_id).await?;
        handle.advance(LifecycleState::Started);

        if !attach {
            handle.advance(LifecycleState::Running);
            return Ok(());
        }

        let code = self.engine.wait_container(&engine_id).await?;
        drop(attachment);
        handle.exit_code = Some(code);
        handle.advance(LifecycleState::Exited);
        if code == 0 {
            Ok(())
        } else {
            Err(BockOsError::engine(
                "wait",
                format!("container {} exited with status {code}", spec.id),
            ))
        }
    }

    async fn import_once(&self, spec: &ContainerSpec, archive: &Path) -> BockOsResult<()> {
        let stamp = stamp_path(&self.state_dir, &spec.id);
        if stamp.exists() {
            tracing::debug!(container = %spec.id, "Image already imported");
            return Ok(());
        }

        let image = ImageRef::parse(&spec.image);
        tracing::info!(container = %spec.id, image = %image, archive = %archive.display(), "Importing image");
        self.engine.import_image(archive, &image).await?;
        write_stamp(&stamp, &image.to_string());
        Ok(())
    }
}

/// Record a completed import. Failure only costs a repeat import next boot.
pub(crate) fn write_stamp(stamp: &Path, contents: &str) {
    let result = stamp
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::write(stamp, contents));
    if let Err(e) = result {
        tracing::warn!(stamp = %stamp.display(), error = %e, "Failed to write import stamp");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered() {
        assert!(LifecycleState::Absent < LifecycleState::Imported);
        assert!(LifecycleState::Started < LifecycleState::Running);
        assert!(LifecycleState::Started < LifecycleState::Exited);
    }

    #[test]
    fn handle_into_result() {
        let mut handle = ContainerHandle::new("console");
        handle.advance(LifecycleState::Created);
        assert!(handle.is_ok());

        handle.last_error = Some(BockOsError::engine("start", "boom"));
        let err = handle.into_result().unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn stamp_write_failure_is_swallowed() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("stamps");
        std::fs::write(&blocker, "not a dir").unwrap();
        write_stamp(&blocker.join("console"), "x");
        assert!(!blocker.join("console").exists());

        let stamp = temp.path().join("ok").join("stamps").join("console");
        write_stamp(&stamp, "bockos/console:v1");
        assert_eq!(std::fs::read_to_string(stamp).unwrap(), "bockos/console:v1");
    }
}
