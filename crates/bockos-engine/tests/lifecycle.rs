//! Container lifecycle against the recording engine.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use bockos_common::paths::stamp_path;
use bockos_config::ContainerSpec;
use bockos_engine::convert::CONFIG_HASH_LABEL;
use bockos_engine::testing::{Call, RecordingEngine};
use bockos_engine::{LifecycleManager, LifecycleState, StartOutcome};

fn spec(yaml: &str) -> ContainerSpec {
    ContainerSpec::from_yaml(yaml).unwrap()
}

fn manager(engine: &Arc<RecordingEngine>, state_dir: &std::path::Path) -> LifecycleManager {
    LifecycleManager::new(engine.clone(), state_dir).with_lookup(Arc::new(|_| None))
}

#[test_log::test(tokio::test)]
async fn disabled_container_is_skipped() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = manager(&engine, temp.path())
        .with_disabled(BTreeSet::from(["network-services".to_string()]));

    let mut outcomes = Vec::new();
    for spec in [
        spec("id: network-services\nimage: bockos/network:v1"),
        spec("id: console\nimage: bockos/console:v1"),
    ] {
        outcomes.push(lifecycle.start_and_wait(&spec).await);
    }

    assert!(matches!(&outcomes[0], StartOutcome::Disabled { id } if id == "network-services"));
    assert!(matches!(&outcomes[1], StartOutcome::Launched(h) if h.is_ok()));
    assert_eq!(engine.started(), vec!["console"]);
}

#[test_log::test(tokio::test)]
async fn unstamped_image_is_imported_before_create() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = manager(&engine, temp.path());

    let foo = spec("id: foo\nimage: foo:1.0\nimport: /usr/share/bockos/foo.tar");
    let StartOutcome::Launched(handle) = lifecycle.start_and_wait(&foo).await else {
        panic!("foo is not disabled");
    };
    assert!(handle.is_ok());
    assert_eq!(handle.state, LifecycleState::Running);

    assert_eq!(
        engine.summaries(),
        vec!["import:foo:1.0", "inspect:foo", "create:foo", "start:foo"]
    );
    assert!(matches!(
        &engine.calls()[0],
        Call::Import { archive, .. } if *archive == PathBuf::from("/usr/share/bockos/foo.tar")
    ));
    assert!(stamp_path(temp.path(), "foo").exists());
}

#[test_log::test(tokio::test)]
async fn stamped_image_skips_import() {
    let temp = tempfile::tempdir().unwrap();
    let stamp = stamp_path(temp.path(), "foo");
    std::fs::create_dir_all(stamp.parent().unwrap()).unwrap();
    std::fs::write(&stamp, "foo:1.0").unwrap();

    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = manager(&engine, temp.path());
    let foo = spec("id: foo\nimage: foo:1.0\nimport: /usr/share/bockos/foo.tar");
    lifecycle.start_and_wait(&foo).await;

    assert_eq!(engine.summaries(), vec!["inspect:foo", "create:foo", "start:foo"]);
}

#[test_log::test(tokio::test)]
async fn failed_import_leaves_no_stamp() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new().failing("import:foo:1.0", "bad archive"));
    let lifecycle = manager(&engine, temp.path());

    let foo = spec("id: foo\nimage: foo:1.0\nimport: /usr/share/bockos/foo.tar");
    let StartOutcome::Launched(handle) = lifecycle.start_and_wait(&foo).await else {
        panic!("foo is not disabled");
    };

    assert_eq!(handle.state, LifecycleState::Absent);
    assert!(handle.last_error.is_some());
    assert!(!stamp_path(temp.path(), "foo").exists());
    assert_eq!(engine.summaries(), vec!["import:foo:1.0"]);
}

#[test_log::test(tokio::test)]
async fn failure_of_one_container_does_not_stop_the_next() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new().failing("start:udev", "no such device"));
    let lifecycle = manager(&engine, temp.path());

    let udev = lifecycle
        .start_and_wait(&spec("id: udev\nimage: bockos/udev:v1"))
        .await;
    let ntp = lifecycle
        .start_and_wait(&spec("id: ntp\nimage: bockos/ntp:v1"))
        .await;

    let StartOutcome::Launched(udev) = udev else { panic!("udev is not disabled") };
    assert_eq!(udev.state, LifecycleState::Created);
    assert!(udev.into_result().is_err());

    let StartOutcome::Launched(ntp) = ntp else { panic!("ntp is not disabled") };
    assert_eq!(ntp.state, LifecycleState::Running);
    assert_eq!(engine.started(), vec!["udev", "ntp"]);
}

#[test_log::test(tokio::test)]
async fn bad_spec_is_a_per_container_error() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = manager(&engine, temp.path());

    let outcome = lifecycle
        .start_and_wait(&spec("id: web\nimage: x\nports: ['eighty']"))
        .await;
    let StartOutcome::Launched(handle) = outcome else { panic!("web is not disabled") };
    assert!(handle.last_error.is_some());
    assert!(engine.calls().is_empty());
}

#[test_log::test(tokio::test)]
async fn console_with_tty_attaches_before_start_and_waits() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = manager(&engine, temp.path()).with_console("console", true);

    let outcome = lifecycle
        .start_and_wait(&spec("id: console\nimage: bockos/console:v1"))
        .await;
    let StartOutcome::Launched(handle) = outcome else { panic!("console is not disabled") };

    assert!(handle.attached);
    assert_eq!(handle.exit_code, Some(0));
    assert_eq!(handle.state, LifecycleState::Exited);
    assert_eq!(
        engine.summaries(),
        vec![
            "inspect:console",
            "create:console",
            "attach:console",
            "start:console",
            "wait:console"
        ]
    );

    let Call::Create { config, .. } = &engine.calls()[1] else {
        panic!("second call is create");
    };
    assert!(config.tty && config.open_stdin && config.attach_stdin);
}

#[test_log::test(tokio::test)]
async fn console_without_tty_runs_detached() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = manager(&engine, temp.path()).with_console("console", false);

    lifecycle
        .start_and_wait(&spec("id: console\nimage: bockos/console:v1"))
        .await;
    assert!(!engine.summaries().iter().any(|c| c.starts_with("attach")));
    assert!(!engine.summaries().iter().any(|c| c.starts_with("wait")));
}

#[test_log::test(tokio::test)]
async fn non_zero_exit_is_recorded() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new().exiting_with(3));
    let lifecycle = manager(&engine, temp.path()).with_console("rescue", true);

    let outcome = lifecycle
        .start_and_wait(&spec("id: rescue\nimage: bockos/rescue:v1"))
        .await;
    let StartOutcome::Launched(handle) = outcome else { panic!("rescue is not disabled") };
    assert_eq!(handle.exit_code, Some(3));
    assert!(handle.last_error.unwrap().to_string().contains("status 3"));
}

#[test_log::test(tokio::test)]
async fn unchanged_container_is_reused() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = manager(&engine, temp.path());
    let syslog = spec("id: syslog\nimage: bockos/syslog:v1");

    lifecycle.start_and_wait(&syslog).await;
    lifecycle.start_and_wait(&syslog).await;

    assert_eq!(
        engine.summaries(),
        vec!["inspect:syslog", "create:syslog", "start:syslog", "inspect:syslog", "start:syslog"]
    );
}

#[test_log::test(tokio::test)]
async fn edited_definition_recreates_container() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = manager(&engine, temp.path());

    lifecycle
        .start_and_wait(&spec("id: ntp\nimage: bockos/ntp:v1"))
        .await;
    let StartOutcome::Launched(handle) = lifecycle
        .start_and_wait(&spec("id: ntp\nimage: bockos/ntp:v2"))
        .await
    else {
        panic!("ntp is not disabled");
    };
    assert!(handle.is_ok());

    assert_eq!(
        engine.summaries(),
        vec![
            "inspect:ntp",
            "create:ntp",
            "start:ntp",
            "inspect:ntp",
            "remove:ntp",
            "create:ntp",
            "start:ntp",
        ]
    );
    let Call::Create { config, .. } = &engine.calls()[5] else {
        panic!("sixth call is create");
    };
    assert_eq!(config.image, "bockos/ntp:v2");
}

#[test_log::test(tokio::test)]
async fn unlabeled_container_is_replaced() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new().with_container("syslog"));
    let lifecycle = manager(&engine, temp.path());

    lifecycle
        .start_and_wait(&spec("id: syslog\nimage: bockos/syslog:v1"))
        .await;
    assert_eq!(
        engine.summaries(),
        vec!["inspect:syslog", "remove:syslog", "create:syslog", "start:syslog"]
    );
}

#[test_log::test(tokio::test)]
async fn failed_removal_keeps_old_container() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        RecordingEngine::new()
            .with_container("syslog")
            .failing("remove:syslog", "device busy"),
    );
    let lifecycle = manager(&engine, temp.path());

    let StartOutcome::Launched(handle) = lifecycle
        .start_and_wait(&spec("id: syslog\nimage: bockos/syslog:v1"))
        .await
    else {
        panic!("syslog is not disabled");
    };
    assert!(handle.last_error.unwrap().to_string().contains("device busy"));
    assert!(engine.has_container("syslog"));
    assert!(engine.started().is_empty());
}

#[test_log::test(tokio::test)]
async fn create_body_carries_hash_and_substitutions() {
    let temp = tempfile::tempdir().unwrap();
    let engine = Arc::new(RecordingEngine::new());
    let lifecycle = LifecycleManager::new(engine.clone(), temp.path()).with_lookup(Arc::new(
        |name| (name == "ENGINE_OPTS").then(|| "--debug".to_string()),
    ));

    lifecycle
        .start_and_wait(&spec(
            "id: docker\nimage: bockos/docker:v1\nenvironment: [ENGINE_OPTS]",
        ))
        .await;

    let Call::Create { config, .. } = &engine.calls()[1] else {
        panic!("second call is create");
    };
    assert_eq!(config.env, vec!["ENGINE_OPTS=--debug"]);
    assert_eq!(config.labels[CONFIG_HASH_LABEL].len(), 64);
}
