// ABOUTME: Integration tests for the upgrade orchestrator.
// ABOUTME: Drives whole jobs against the in-memory runtime and follows them through the status store.

mod support;

use std::sync::Arc;
use std::time::Duration;
use support::mock_runtime::{Call, MockRuntime, managed_container, volume_mount};
use tokio_util::sync::CancellationToken;
use upshift::config::{StatusConfig, UpgradeConfig};
use upshift::runtime::{ContainerState, HealthState, RestartPolicyConfig};
use upshift::status::{JobStatus, UpgradeStatusStore};
use upshift::types::{ContainerId, ImageRef, LogToken, Provenance};
use upshift::upgrade::{ReplacementOrder, UpgradeError, UpgradeRequest, Upgrader};

struct Harness {
    runtime: MockRuntime,
    store: Arc<UpgradeStatusStore>,
    upgrader: Upgrader<MockRuntime>,
    _dir: tempfile::TempDir,
}

fn status_config(dir: &tempfile::TempDir) -> StatusConfig {
    StatusConfig {
        log_dir: Some(dir.path().to_path_buf()),
        poll_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
        flush_grace: Duration::from_millis(10),
        ..StatusConfig::default()
    }
}

fn harness_with(config: UpgradeConfig) -> Harness {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new();
    let mut server = managed_container("old", "server", "registry.local/app:1");
    server.mounts = vec![volume_mount("data", "/srv")];
    runtime.add_container(server);

    let store = Arc::new(UpgradeStatusStore::new(status_config(&dir)));
    let upgrader = Upgrader::new(
        Arc::new(runtime.clone()),
        Arc::clone(&store),
        config,
        Provenance::default(),
    );
    Harness {
        runtime,
        store,
        upgrader,
        _dir: dir,
    }
}

fn fast_config() -> UpgradeConfig {
    UpgradeConfig {
        image: Some(ImageRef::parse("registry.local/app:2").unwrap()),
        health_timeout: Duration::from_millis(150),
        health_poll_interval: Duration::from_millis(10),
        ..UpgradeConfig::default()
    }
}

/// Poll the job until it is done; returns every line and the final status.
async fn follow(store: &UpgradeStatusStore, token: &LogToken) -> (Vec<String>, JobStatus) {
    let cancel = CancellationToken::new();
    let mut lines = Vec::new();
    let mut offset = 0;
    for _ in 0..200 {
        let response = store.upgrade_status(token.as_str(), offset, &cancel).await.unwrap();
        lines.extend(response.lines);
        offset = response.offset;
        if response.done {
            return (lines, response.status);
        }
    }
    panic!("job never finished; lines so far: {:?}", lines);
}

fn position(calls: &[Call], matches: impl Fn(&Call) -> bool) -> usize {
    calls
        .iter()
        .position(matches)
        .unwrap_or_else(|| panic!("call missing from {:?}", calls))
}

mod preconditions {
    use super::*;

    #[tokio::test]
    async fn stopped_container_is_rejected_without_a_job() {
        let h = harness_with(fast_config());
        let mut stopped = managed_container("idle", "idle", "app:1");
        stopped.state = ContainerState::Exited;
        h.runtime.add_container(stopped);

        let err = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("idle"), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UpgradeError::ContainerNotRunning { .. }));
        assert!(err.is_precondition());
        assert!(!h.store.is_any_upgrade_running());
        assert_eq!(std::fs::read_dir(h.store.log_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unknown_container_is_not_running() {
        let h = harness_with(fast_config());

        let err = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("ghost"), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, UpgradeError::ContainerNotRunning { .. }));
    }

    #[tokio::test]
    async fn container_without_provenance_label_is_rejected() {
        let h = harness_with(fast_config());
        let mut foreign = managed_container("foreign", "foreign", "app:1");
        foreign.labels.clear();
        h.runtime.add_container(foreign);

        let err = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("foreign"), CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            UpgradeError::NotInstalledByTool { label, .. } => {
                assert_eq!(label, Provenance::default().to_string());
            }
            other => panic!("expected NotInstalledByTool, got {:?}", other),
        }
        assert!(h.runtime.calls().iter().all(|c| !c.is_mutation()));
    }

    #[tokio::test]
    async fn second_upgrade_of_the_same_target_is_rejected() {
        let h = harness_with(fast_config());
        h.runtime.block_pulls();

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), CancellationToken::new())
            .await
            .unwrap();
        h.runtime.wait_for_call(|c| matches!(c, Call::Pull(_))).await;

        let err = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("server"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpgradeError::AlreadyInProgress { .. }));
        assert!(h.store.is_any_upgrade_running());
        assert!(h.store.is_target_upgrading(&ContainerId::new("old")));
        assert_eq!(h.store.job_status(&token), Some(JobStatus::Running));

        h.runtime.release_pulls();
        let (_, status) = follow(&h.store, &token).await;
        assert_eq!(status, JobStatus::Succeeded);
        assert!(!h.store.is_any_upgrade_running());
    }
}

mod stop_then_start {
    use super::*;

    #[tokio::test]
    async fn happy_path_runs_steps_in_order() {
        let h = harness_with(fast_config());

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("server"), CancellationToken::new())
            .await
            .unwrap();
        let (lines, status) = follow(&h.store, &token).await;

        assert_eq!(status, JobStatus::Succeeded, "lines: {:?}", lines);
        let calls = h.runtime.calls();
        let pull = position(&calls, |c| *c == Call::Pull("registry.local/app:2".to_string()));
        let stop = position(&calls, |c| *c == Call::Stop("old".to_string()));
        let volume = position(&calls, |c| matches!(c, Call::CreateVolume(_)));
        let helper = position(&calls, |c| matches!(c, Call::Run { helper: true, .. }));
        let replacement = position(&calls, |c| matches!(c, Call::Run { helper: false, .. }));
        let retire = position(&calls, |c| {
            *c == Call::UpdateRestart("old".to_string(), RestartPolicyConfig::No)
        });
        assert!(pull < stop && stop < volume && volume < helper);
        assert!(helper < replacement && replacement < retire);

        let old = h.runtime.container("old").unwrap();
        assert_eq!(old.state, ContainerState::Exited);
        assert_eq!(old.restart_policy, RestartPolicyConfig::No);

        assert!(lines.iter().any(|l| l.contains("-> replacement-healthy(")));
        assert!(lines.iter().any(|l| l.contains("old-retired(")));
        assert!(lines.iter().any(|l| l.contains("completed successfully")));
    }

    #[tokio::test]
    async fn replacement_inherits_the_old_container_setup() {
        let h = harness_with(fast_config());

        let token = h
            .upgrader
            .start_upgrade(
                UpgradeRequest::new("old").with_new_container_name("server-next"),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        follow(&h.store, &token).await;

        let spec = h
            .runtime
            .runs()
            .into_iter()
            .find(|s| !s.auto_remove)
            .unwrap();
        assert_eq!(spec.name.as_deref(), Some("server-next"));
        assert_eq!(spec.image.to_string(), "registry.local/app:2");
        assert_eq!(spec.env, vec!["MODE=server".to_string()]);
        assert_eq!(spec.volumes_from, vec![ContainerId::new("old")]);
        assert_eq!(spec.restart_policy, RestartPolicyConfig::UnlessStopped);
        let provenance = Provenance::default();
        assert_eq!(spec.labels.get(&provenance.key), Some(&provenance.value));
    }

    #[tokio::test]
    async fn generated_name_uses_the_configured_prefix() {
        let h = harness_with(fast_config());

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), CancellationToken::new())
            .await
            .unwrap();
        follow(&h.store, &token).await;

        let spec = h.runtime.runs().into_iter().find(|s| !s.auto_remove).unwrap();
        assert!(spec.name.unwrap().starts_with("upshift-server-"));
    }

    #[tokio::test]
    async fn without_configured_image_the_current_reference_is_pulled_again() {
        let h = harness_with(UpgradeConfig {
            image: None,
            ..fast_config()
        });

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), CancellationToken::new())
            .await
            .unwrap();
        let (_, status) = follow(&h.store, &token).await;

        assert_eq!(status, JobStatus::Succeeded);
        assert!(h.runtime.calls().contains(&Call::Pull("registry.local/app:1".to_string())));
    }

    #[tokio::test]
    async fn health_timeout_fails_and_leaves_old_stopped() {
        let h = harness_with(fast_config());
        h.runtime.set_health_sequence([HealthState::Starting]);

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), CancellationToken::new())
            .await
            .unwrap();
        let (lines, status) = follow(&h.store, &token).await;

        assert_eq!(status, JobStatus::Failed);
        assert!(
            lines.iter().any(|l| l.contains("did not become healthy")),
            "lines: {:?}",
            lines
        );
        assert_eq!(h.runtime.container("old").unwrap().state, ContainerState::Exited);
        assert_eq!(
            h.runtime.count(|c| matches!(c, Call::UpdateRestart(id, _) if id == "old")),
            0
        );

        let settled = h.runtime.calls().len();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.runtime.calls().len(), settled, "no calls after the job ended");
    }

    #[tokio::test]
    async fn pull_failure_leaves_old_running() {
        let h = harness_with(fast_config());
        h.runtime.fail_pull("registry.local/app:2");

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), CancellationToken::new())
            .await
            .unwrap();
        let (lines, status) = follow(&h.store, &token).await;

        assert_eq!(status, JobStatus::Failed);
        assert!(lines.iter().any(|l| l.contains("failed to pull image")));
        assert_eq!(h.runtime.container("old").unwrap().state, ContainerState::Running);
    }

    #[tokio::test]
    async fn restart_policy_failure_is_a_warning() {
        let h = harness_with(fast_config());
        h.runtime.fail_update_restart();

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), CancellationToken::new())
            .await
            .unwrap();
        let (lines, status) = follow(&h.store, &token).await;

        assert_eq!(status, JobStatus::Succeeded);
        assert!(lines.iter().any(|l| l.contains("Warning: failed to disable restart policy")));
        assert!(lines.iter().any(|l| l.contains("docker rm server")));
    }

    #[tokio::test]
    async fn cancellation_stops_the_job() {
        let h = harness_with(fast_config());
        h.runtime.block_pulls();
        let cancel = CancellationToken::new();

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), cancel.clone())
            .await
            .unwrap();
        h.runtime.wait_for_call(|c| matches!(c, Call::Pull(_))).await;
        cancel.cancel();

        let (lines, status) = follow(&h.store, &token).await;
        h.runtime.release_pulls();

        assert_eq!(status, JobStatus::Failed);
        assert!(lines.iter().any(|l| l.contains("cancelled")));
        assert_eq!(h.runtime.count(|c| matches!(c, Call::Stop(_))), 0);
    }
}

mod start_then_stop {
    use super::*;

    fn config() -> UpgradeConfig {
        UpgradeConfig {
            order: ReplacementOrder::StartThenStop,
            ..fast_config()
        }
    }

    #[tokio::test]
    async fn old_is_stopped_only_after_replacement_is_healthy() {
        let h = harness_with(config());

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), CancellationToken::new())
            .await
            .unwrap();
        let (_, status) = follow(&h.store, &token).await;

        assert_eq!(status, JobStatus::Succeeded);
        let calls = h.runtime.calls();
        let replacement = position(&calls, |c| matches!(c, Call::Run { helper: false, .. }));
        let stop = position(&calls, |c| *c == Call::Stop("old".to_string()));
        assert!(replacement < stop);
        assert_eq!(h.runtime.container("old").unwrap().state, ContainerState::Exited);
    }

    #[tokio::test]
    async fn unhealthy_replacement_is_discarded_and_old_keeps_serving() {
        let h = harness_with(config());
        h.runtime.set_health_sequence([HealthState::Starting, HealthState::Unhealthy]);

        let token = h
            .upgrader
            .start_upgrade(UpgradeRequest::new("old"), CancellationToken::new())
            .await
            .unwrap();
        let (lines, status) = follow(&h.store, &token).await;

        assert_eq!(status, JobStatus::Failed);
        assert!(lines.iter().any(|l| l.contains("keeps running")));
        assert_eq!(h.runtime.container("old").unwrap().state, ContainerState::Running);

        let new_id = h
            .runtime
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Stop(id) if id.starts_with("new-") => Some(id),
                _ => None,
            })
            .expect("replacement was stopped");
        assert_eq!(
            h.runtime.container(&new_id).unwrap().restart_policy,
            RestartPolicyConfig::No
        );
    }

    #[tokio::test]
    async fn failing_to_stop_old_is_only_a_warning() {
        let h = harness_with(config());
        h.runtime.fail_stop("old");

        let token = h
            .upgrader
            .start_upgrade(
                UpgradeRequest::new("old").with_order(ReplacementOrder::StartThenStop),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let (lines, status) = follow(&h.store, &token).await;

        assert_eq!(status, JobStatus::Succeeded);
        assert!(lines.iter().any(|l| l.contains("Warning: failed to stop container server")));
    }
}
