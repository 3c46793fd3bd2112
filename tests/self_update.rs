// ABOUTME: Integration tests for the self-update loop.
// ABOUTME: Checks skip rules, single-flight pulls, API server handling and replacement.

mod support;

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use support::mock_runtime::{Call, MockRuntime, managed_container};
use tokio_util::sync::CancellationToken;
use upshift::config::{SelfUpdateConfig, StatusConfig};
use upshift::runtime::{ContainerState, HealthState, RestartPolicyConfig};
use upshift::self_update::{
    ApiServer, ApiServerError, SelfUpdateError, SelfUpdateOutcome, SelfUpdater, SkipReason,
};
use upshift::status::UpgradeStatusStore;
use upshift::types::{ContainerId, LogToken};

const SELF_IMAGE: &str = "registry.local/upshift:latest";

#[derive(Default)]
struct CountingApiServer {
    stops: AtomicUsize,
    starts: AtomicUsize,
}

#[async_trait]
impl ApiServer for CountingApiServer {
    async fn stop(&self) -> Result<(), ApiServerError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self) -> Result<(), ApiServerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    runtime: MockRuntime,
    api: Arc<CountingApiServer>,
    store: Arc<UpgradeStatusStore>,
    updater: Arc<SelfUpdater<MockRuntime>>,
    _dir: tempfile::TempDir,
}

fn harness_with(config: SelfUpdateConfig) -> Harness {
    support::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let runtime = MockRuntime::new();
    runtime.add_container(managed_container("self", "upshift-api", SELF_IMAGE));
    let api = Arc::new(CountingApiServer::default());
    let store = Arc::new(UpgradeStatusStore::new(StatusConfig {
        log_dir: Some(dir.path().to_path_buf()),
        ..StatusConfig::default()
    }));
    let updater = Arc::new(SelfUpdater::new(
        Arc::new(runtime.clone()),
        api.clone(),
        Arc::clone(&store),
        config,
    ));
    Harness {
        runtime,
        api,
        store,
        updater,
        _dir: dir,
    }
}

fn config() -> SelfUpdateConfig {
    SelfUpdateConfig {
        hostname: Some("self".to_string()),
        health_timeout: Duration::from_millis(150),
        health_poll_interval: Duration::from_millis(10),
        ..SelfUpdateConfig::default()
    }
}

#[tokio::test]
async fn same_image_id_is_up_to_date() {
    let h = harness_with(config());
    h.runtime.set_image_id(SELF_IMAGE, "sha256:self-current");

    let outcome = h.updater.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, SelfUpdateOutcome::UpToDate);
    assert_eq!(h.runtime.count(|c| *c == Call::Pull(SELF_IMAGE.to_string())), 1);
    assert_eq!(h.api.stops.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_checks_pull_once() {
    let h = harness_with(config());
    h.runtime.set_image_id(SELF_IMAGE, "sha256:self-current");
    h.runtime.block_pulls();

    let first = {
        let updater = Arc::clone(&h.updater);
        tokio::spawn(async move { updater.run_once(&CancellationToken::new()).await })
    };
    h.runtime.wait_for_call(|c| matches!(c, Call::Pull(_))).await;
    let calls_before = h.runtime.calls().len();

    let second = h.updater.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(second, SelfUpdateOutcome::Skipped(SkipReason::AlreadyRunning));
    assert_eq!(h.runtime.calls().len(), calls_before);

    h.runtime.release_pulls();
    let first = first.await.unwrap().unwrap();
    assert_eq!(first, SelfUpdateOutcome::UpToDate);
    assert_eq!(h.runtime.count(|c| matches!(c, Call::Pull(_))), 1);
}

#[tokio::test]
async fn running_upgrade_skips_the_update() {
    let h = harness_with(config());
    let token = LogToken::parse("upgrade.busy.log").unwrap();
    assert!(h.store.register(token, ContainerId::new("server")));

    let outcome = h.updater.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, SelfUpdateOutcome::Skipped(SkipReason::UpgradeInProgress));
    assert_eq!(h.api.stops.load(Ordering::SeqCst), 0);
    assert_eq!(h.runtime.count(|c| matches!(c, Call::Run { .. })), 0);
}

/// Starts an upgrade job while the API server is being stopped.
struct UpgradeDuringStop {
    store: Arc<UpgradeStatusStore>,
    starts: AtomicUsize,
}

#[async_trait]
impl ApiServer for UpgradeDuringStop {
    async fn stop(&self) -> Result<(), ApiServerError> {
        let token = LogToken::parse("upgrade.late.log").unwrap();
        assert!(self.store.register(token, ContainerId::new("server")));
        Ok(())
    }

    async fn start(&self) -> Result<(), ApiServerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn upgrade_started_while_stopping_restarts_the_api_server() {
    let h = harness_with(config());
    let api = Arc::new(UpgradeDuringStop {
        store: Arc::clone(&h.store),
        starts: AtomicUsize::new(0),
    });
    let updater = SelfUpdater::new(
        Arc::new(h.runtime.clone()),
        api.clone(),
        Arc::clone(&h.store),
        config(),
    );

    let outcome = updater.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, SelfUpdateOutcome::Skipped(SkipReason::UpgradeInProgress));
    assert_eq!(api.starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.runtime.count(|c| matches!(c, Call::Run { .. })), 0);
    assert_eq!(h.runtime.container("self").unwrap().state, ContainerState::Running);
}

#[tokio::test]
async fn newer_image_replaces_this_container() {
    let h = harness_with(config());

    let outcome = h.updater.run_once(&CancellationToken::new()).await.unwrap();

    let SelfUpdateOutcome::Updated { container, warnings } = outcome else {
        panic!("expected Updated, got {:?}", outcome);
    };
    assert!(warnings.is_empty());
    assert_eq!(h.runtime.container(container.as_str()).unwrap().state, ContainerState::Running);

    let old = h.runtime.container("self").unwrap();
    assert_eq!(old.state, ContainerState::Exited);
    assert_eq!(old.restart_policy, RestartPolicyConfig::No);
    assert_eq!(h.api.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.api.starts.load(Ordering::SeqCst), 0);

    let spec = h.runtime.runs().into_iter().next().unwrap();
    assert!(spec.name.unwrap().starts_with("upshift-"));
    assert_eq!(spec.volumes_from, vec![ContainerId::new("self")]);
}

#[tokio::test]
async fn unhealthy_replacement_restarts_the_api_server() {
    let h = harness_with(config());
    h.runtime.set_health_sequence([HealthState::Unhealthy]);

    let err = h.updater.run_once(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, SelfUpdateError::HealthCheck { .. }));
    assert_eq!(h.api.stops.load(Ordering::SeqCst), 1);
    assert_eq!(h.api.starts.load(Ordering::SeqCst), 1);
    assert_eq!(h.runtime.container("self").unwrap().state, ContainerState::Running);
    assert_eq!(
        h.runtime.count(|c| matches!(c, Call::Stop(id) if id.starts_with("new-"))),
        1
    );
}

#[tokio::test]
async fn disabled_pull_uses_the_local_image() {
    let h = harness_with(SelfUpdateConfig {
        disable_pull: true,
        ..config()
    });
    h.runtime.set_image_id(SELF_IMAGE, "sha256:self-current");

    let outcome = h.updater.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, SelfUpdateOutcome::UpToDate);
    assert_eq!(h.runtime.count(|c| matches!(c, Call::Pull(_))), 0);
}

#[tokio::test]
async fn missing_own_container_is_an_error() {
    let h = harness_with(SelfUpdateConfig {
        hostname: Some("elsewhere".to_string()),
        ..config()
    });

    let err = h.updater.run_once(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, SelfUpdateError::LocateSelf { .. }));
}

#[tokio::test]
async fn scheduler_checks_on_start_and_stops_on_cancel() {
    let h = harness_with(SelfUpdateConfig {
        check_on_start: true,
        interval: Duration::from_secs(3600),
        ..config()
    });
    h.runtime.set_image_id(SELF_IMAGE, "sha256:self-current");
    let cancel = CancellationToken::new();

    let handle = Arc::clone(&h.updater).start(cancel.clone());
    h.runtime.wait_for_call(|c| matches!(c, Call::InspectImage(_))).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler stops on cancel")
        .unwrap();
    assert_eq!(h.runtime.count(|c| matches!(c, Call::Pull(_))), 1);
}
