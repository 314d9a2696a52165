//! Which containers a boot starts.

use std::collections::BTreeSet;
use std::sync::Arc;

use bockos_config::{Config, ContainerSpec, run_init_funcs};
use bockos_engine::Engine;
use bockos_engine::testing::RecordingEngine;
use bockos::sysinit::{init_funcs, lifecycle_for, run_containers};
use proptest::prelude::*;

fn spec(id: &str) -> ContainerSpec {
    ContainerSpec {
        image: format!("bockos/{id}:v1"),
        ..ContainerSpec::placeholder(id)
    }
}

fn boot_config(ids: &[String], disabled: &BTreeSet<String>, rescue: bool) -> Config {
    let mut config = Config::defaults().unwrap();
    config.system_containers = ids.iter().map(|id| spec(id)).collect();
    config.disable = disabled.clone();
    config.rescue = rescue;
    config.rescue_container = spec("rescue");
    config
}

fn started(config: &Config) -> Vec<String> {
    let engine = Arc::new(RecordingEngine::new());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let lifecycle = lifecycle_for(config, engine.clone(), false);
        run_containers(&lifecycle, &config.boot_containers()).await;
    });
    engine.started()
}

proptest! {
    #[test]
    fn started_set_is_list_minus_disabled_or_rescue(
        ids in prop::collection::btree_set("[a-z]{3,8}", 0..8),
        mask in prop::collection::vec(any::<bool>(), 8),
        rescue in any::<bool>(),
    ) {
        let ids: Vec<String> = ids.into_iter().collect();
        let disabled: BTreeSet<String> = ids
            .iter()
            .zip(&mask)
            .filter(|(_, off)| **off)
            .map(|(id, _)| id.clone())
            .chain(rescue.then(|| "rescue".to_string()))
            .collect();

        let temp = tempfile::tempdir().unwrap();
        let mut config = boot_config(&ids, &disabled, rescue);
        config.state_dir = temp.path().to_path_buf();

        let started = started(&config);
        if rescue {
            prop_assert_eq!(started, vec!["rescue".to_string()]);
        } else {
            let expected: Vec<String> = ids.iter().filter(|id| !disabled.contains(*id)).cloned().collect();
            prop_assert_eq!(started, expected);
        }
    }
}

#[test]
fn disabled_network_services_are_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let ids = vec!["network-services".to_string(), "console".to_string()];
    let disabled = BTreeSet::from(["network-services".to_string()]);
    let mut config = boot_config(&ids, &disabled, false);
    config.state_dir = temp.path().to_path_buf();

    assert_eq!(started(&config), vec!["console"]);
}

#[test]
fn rescue_replaces_the_whole_list() {
    let temp = tempfile::tempdir().unwrap();
    let ids = vec!["syslog".to_string(), "udev".to_string(), "console".to_string()];
    let mut config = boot_config(&ids, &BTreeSet::new(), true);
    config.state_dir = temp.path().to_path_buf();

    assert_eq!(started(&config), vec!["rescue"]);
}

#[test_log::test(tokio::test)]
async fn full_phase_sequence_continues_past_container_failure() {
    let temp = tempfile::tempdir().unwrap();
    let ids = vec!["syslog".to_string(), "udev".to_string(), "ntp".to_string()];
    let mut config = boot_config(&ids, &BTreeSet::new(), false);
    config.state_dir = temp.path().join("state");
    config.images.dir = temp.path().join("no-images");

    let recording = Arc::new(RecordingEngine::new().failing("create:udev", "bad image"));
    let engine: Arc<dyn Engine> = recording.clone();
    run_init_funcs(&config, &init_funcs(&engine, false))
        .await
        .unwrap();

    assert_eq!(recording.started(), vec!["syslog", "ntp"]);
}
