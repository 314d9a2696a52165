//! Ordered boot-phase functions.

use async_trait::async_trait;
use bockos_common::{BockOsError, BockOsResult};

use crate::document::Config;

/// One boot phase that receives the configuration.
#[async_trait]
pub trait InitFunc: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Run the phase.
    async fn run(&self, config: &Config) -> BockOsResult<()>;
}

/// Run `funcs` in order.
///
/// The first failure stops the sequence and is returned wrapped in
/// [`BockOsError::InitFunc`]; later functions do not run.
///
/// # Errors
///
/// Returns the first init function error.
pub async fn run_init_funcs(config: &Config, funcs: &[Box<dyn InitFunc>]) -> BockOsResult<()> {
    for func in funcs {
        let name = func.name();
        tracing::info!(phase = %name, "Running init function");

        if let Err(source) = func.run(config).await {
            tracing::error!(phase = %name, error = %source, "Init function failed");
            return Err(BockOsError::InitFunc {
                name: name.to_string(),
                source: Box::new(source),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Recorder {
        name: String,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl InitFunc for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _config: &Config) -> BockOsResult<()> {
            self.log.lock().unwrap().push(self.name.clone());
            if self.fail {
                return Err(BockOsError::Internal {
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn funcs(spec: &[(&str, bool)], log: &Arc<Mutex<Vec<String>>>) -> Vec<Box<dyn InitFunc>> {
        spec.iter()
            .map(|(name, fail)| {
                Box::new(Recorder {
                    name: (*name).to_string(),
                    fail: *fail,
                    log: Arc::clone(log),
                }) as Box<dyn InitFunc>
            })
            .collect()
    }

    #[tokio::test]
    async fn runs_all_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = Config::defaults().unwrap();
        run_init_funcs(&config, &funcs(&[("a", false), ("b", false)], &log))
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn first_failure_aborts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let config = Config::defaults().unwrap();
        let err = run_init_funcs(
            &config,
            &funcs(&[("a", false), ("b", true), ("c", false)], &log),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, BockOsError::InitFunc { ref name, .. } if name == "b"));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }
}
