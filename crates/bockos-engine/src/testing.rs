//! In-memory [`Engine`] that records every call.
//!
//! Used by the boot and switch tests of this workspace; behaves like an
//! engine that accepts everything unless told to fail.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bockos_common::{BockOsError, BockOsResult};
use parking_lot::Mutex;

use crate::client::{Attachment, Engine, ExistingContainer};
use crate::reference::ImageRef;
use crate::types::CreateConfig;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `ping`
    Ping,
    /// `import_image`
    Import {
        /// Archive path.
        archive: PathBuf,
        /// Target image.
        image: String,
    },
    /// `load_image`
    Load {
        /// Archive path.
        archive: PathBuf,
    },
    /// `inspect_container`
    Inspect {
        /// Container name.
        name: String,
    },
    /// `create_container`
    Create {
        /// Container name.
        name: String,
        /// Create body.
        config: Box<CreateConfig>,
    },
    /// `start_container`
    Start {
        /// Container id.
        id: String,
    },
    /// `attach_container`
    Attach {
        /// Container id.
        id: String,
    },
    /// `wait_container`
    Wait {
        /// Container id.
        id: String,
    },
    /// `restart_container`
    Restart {
        /// Container id.
        id: String,
        /// Stop timeout.
        timeout: Duration,
    },
    /// `remove_container`
    Remove {
        /// Container id.
        id: String,
    },
}

impl Call {
    /// Short `op:target` form, handy for asserting on call order.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Ping => "ping".to_string(),
            Self::Import { image, .. } => format!("import:{image}"),
            Self::Load { archive } => format!("load:{}", archive.display()),
            Self::Inspect { name } => format!("inspect:{name}"),
            Self::Create { name, .. } => format!("create:{name}"),
            Self::Start { id } => format!("start:{id}"),
            Self::Attach { id } => format!("attach:{id}"),
            Self::Wait { id } => format!("wait:{id}"),
            Self::Restart { id, .. } => format!("restart:{id}"),
            Self::Remove { id } => format!("remove:{id}"),
        }
    }
}

/// Recording engine. Created containers get their name as engine id.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    calls: Mutex<Vec<Call>>,
    containers: Mutex<BTreeMap<String, ExistingContainer>>,
    failures: Mutex<BTreeMap<String, String>>,
    exit_code: Mutex<i64>,
}

impl RecordingEngine {
    /// Engine that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the call whose [`Call::summary`] equals `summary` fail.
    #[must_use]
    pub fn failing(self, summary: &str, message: &str) -> Self {
        self.failures
            .lock()
            .insert(summary.to_string(), message.to_string());
        self
    }

    /// Exit code reported by `wait`.
    #[must_use]
    pub fn exiting_with(self, code: i64) -> Self {
        *self.exit_code.lock() = code;
        self
    }

    /// Pretend a container named `name` already exists.
    #[must_use]
    pub fn with_container(self, name: &str) -> Self {
        self.containers.lock().insert(
            name.to_string(),
            ExistingContainer {
                id: name.to_string(),
                ..ExistingContainer::default()
            },
        );
        self
    }

    /// All calls so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Summaries of all calls so far.
    #[must_use]
    pub fn summaries(&self) -> Vec<String> {
        self.calls.lock().iter().map(Call::summary).collect()
    }

    /// Whether a container named `name` currently exists.
    #[must_use]
    pub fn has_container(&self, name: &str) -> bool {
        self.containers.lock().contains_key(name)
    }

    /// Names passed to `start`, in order.
    #[must_use]
    pub fn started(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Start { id } => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> BockOsResult<()> {
        let summary = call.summary();
        self.calls.lock().push(call);
        match self.failures.lock().get(&summary) {
            Some(message) => Err(BockOsError::engine(summary, message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    async fn ping(&self) -> BockOsResult<()> {
        self.record(Call::Ping)
    }

    async fn import_image(&self, archive: &Path, image: &ImageRef) -> BockOsResult<()> {
        self.record(Call::Import {
            archive: archive.to_path_buf(),
            image: image.to_string(),
        })
    }

    async fn load_image(&self, archive: &Path) -> BockOsResult<()> {
        self.record(Call::Load {
            archive: archive.to_path_buf(),
        })
    }

    async fn inspect_container(&self, name: &str) -> BockOsResult<Option<ExistingContainer>> {
        self.record(Call::Inspect {
            name: name.to_string(),
        })?;
        Ok(self.containers.lock().get(name).cloned())
    }

    async fn create_container(&self, name: &str, config: &CreateConfig) -> BockOsResult<String> {
        self.record(Call::Create {
            name: name.to_string(),
            config: Box::new(config.clone()),
        })?;
        self.containers.lock().insert(
            name.to_string(),
            ExistingContainer {
                id: name.to_string(),
                labels: config.labels.clone(),
                running: false,
            },
        );
        Ok(name.to_string())
    }

    async fn start_container(&self, id: &str) -> BockOsResult<()> {
        self.record(Call::Start { id: id.to_string() })?;
        if let Some(container) = self.containers.lock().get_mut(id) {
            container.running = true;
        }
        Ok(())
    }

    async fn attach_container(&self, id: &str) -> BockOsResult<Attachment> {
        self.record(Call::Attach { id: id.to_string() })?;
        Ok(Attachment::default())
    }

    async fn wait_container(&self, id: &str) -> BockOsResult<i64> {
        self.record(Call::Wait { id: id.to_string() })?;
        Ok(*self.exit_code.lock())
    }

    async fn restart_container(&self, id: &str, timeout: Duration) -> BockOsResult<()> {
        self.record(Call::Restart {
            id: id.to_string(),
            timeout,
        })
    }

    async fn remove_container(&self, id: &str) -> BockOsResult<()> {
        self.record(Call::Remove { id: id.to_string() })?;
        self.containers.lock().remove(id);
        Ok(())
    }
}
