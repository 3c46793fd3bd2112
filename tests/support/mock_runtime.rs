// ABOUTME: In-memory runtime implementing the container, image and volume traits.
// ABOUTME: Records every call and lets tests script health, exit codes and failures.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use upshift::runtime::{
    ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, HealthState, ImageError, ImageOps, MountInfo, MountKind, PortBindings,
    RestartPolicyConfig, RunSpec, VolumeError, VolumeInfo, VolumeOps,
};
use upshift::types::{ContainerId, ImageId, ImageRef, Provenance, VolumeName};

/// One recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Inspect(String),
    Run { name: Option<String>, image: String, helper: bool },
    Start(String),
    Stop(String),
    UpdateRestart(String, RestartPolicyConfig),
    Wait(String),
    List,
    Pull(String),
    InspectImage(String),
    CreateVolume(String),
}

impl Call {
    /// True for calls that change runtime state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Call::Inspect(_) | Call::Wait(_) | Call::List | Call::InspectImage(_)
        )
    }
}

#[derive(Default)]
struct State {
    containers: Vec<ContainerInfo>,
    calls: Vec<Call>,
    runs: Vec<RunSpec>,
    volumes: HashMap<String, HashMap<String, String>>,
    next_id: usize,
    health: VecDeque<HealthState>,
    exit_codes: VecDeque<i64>,
    image_ids: HashMap<String, ImageId>,
    fail_pull: HashSet<String>,
    fail_run: bool,
    fail_stop: HashSet<String>,
    fail_update_restart: bool,
}

/// Scriptable stand-in for a Docker or Podman daemon.
#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<Mutex<State>>,
    pull_gate: Arc<Mutex<Option<Arc<Semaphore>>>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, info: ContainerInfo) {
        self.state.lock().containers.push(info);
    }

    /// Health reported by successive inspects of started containers. The
    /// last entry repeats.
    pub fn set_health_sequence(&self, sequence: impl IntoIterator<Item = HealthState>) {
        self.state.lock().health = sequence.into_iter().collect();
    }

    /// Exit codes of successive helper containers; 0 once exhausted.
    pub fn set_exit_codes(&self, codes: impl IntoIterator<Item = i64>) {
        self.state.lock().exit_codes = codes.into_iter().collect();
    }

    pub fn set_image_id(&self, reference: &str, id: &str) {
        self.state
            .lock()
            .image_ids
            .insert(reference.to_string(), ImageId::new(id));
    }

    pub fn fail_pull(&self, reference: &str) {
        self.state.lock().fail_pull.insert(reference.to_string());
    }

    pub fn fail_run(&self) {
        self.state.lock().fail_run = true;
    }

    pub fn fail_stop(&self, id: &str) {
        self.state.lock().fail_stop.insert(id.to_string());
    }

    pub fn fail_update_restart(&self) {
        self.state.lock().fail_update_restart = true;
    }

    /// Make pulls wait until [`MockRuntime::release_pulls`].
    pub fn block_pulls(&self) {
        *self.pull_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_pulls(&self) {
        if let Some(gate) = self.pull_gate.lock().take() {
            gate.close();
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn runs(&self) -> Vec<RunSpec> {
        self.state.lock().runs.clone()
    }

    pub fn volume_labels(&self, name: &str) -> Option<HashMap<String, String>> {
        self.state.lock().volumes.get(name).cloned()
    }

    pub fn container(&self, id: &str) -> Option<ContainerInfo> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| c.id.as_str() == id || c.name == id)
            .cloned()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| matches(c)).count()
    }

    /// Poll until a recorded call matches, or panic after five seconds.
    pub async fn wait_for_call(&self, matches: impl Fn(&Call) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.count(&matches) == 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected call never happened; calls: {:?}",
                self.calls()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

/// A running container carrying the default provenance label.
pub fn managed_container(id: &str, name: &str, image: &str) -> ContainerInfo {
    let provenance = Provenance::default();
    ContainerInfo {
        id: ContainerId::new(id),
        name: name.to_string(),
        image: image.to_string(),
        image_id: ImageId::new(format!("sha256:{}-current", id)),
        state: ContainerState::Running,
        health: None,
        labels: HashMap::from([(provenance.key, provenance.value)]),
        env: vec!["MODE=server".to_string()],
        command: None,
        mounts: Vec::new(),
        port_bindings: PortBindings::new(),
        restart_policy: RestartPolicyConfig::UnlessStopped,
    }
}

pub fn volume_mount(name: &str, destination: &str) -> MountInfo {
    MountInfo {
        kind: MountKind::Volume,
        name: Some(name.to_string()),
        source: format!("/var/lib/docker/volumes/{}/_data", name),
        destination: destination.to_string(),
        read_only: false,
    }
}

pub fn bind_mount(source: &str, destination: &str) -> MountInfo {
    MountInfo {
        kind: MountKind::Bind,
        name: None,
        source: source.to_string(),
        destination: destination.to_string(),
        read_only: false,
    }
}

#[async_trait]
impl ContainerOps for MockRuntime {
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        self.record(Call::Inspect(id.to_string()));
        let mut state = self.state.lock();
        let index = state
            .containers
            .iter()
            .position(|c| c.id == *id || c.name == id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        let started = state.containers[index].id.as_str().starts_with("new-")
            && state.containers[index].state == ContainerState::Running;
        if started {
            let health = if state.health.len() > 1 {
                state.health.pop_front()
            } else {
                state.health.front().copied()
            };
            state.containers[index].health = Some(health.unwrap_or(HealthState::Healthy));
        }
        Ok(state.containers[index].clone())
    }

    async fn run_container(&self, spec: &RunSpec) -> Result<ContainerId, ContainerError> {
        let helper = spec.auto_remove;
        self.record(Call::Run {
            name: spec.name.clone(),
            image: spec.image.to_string(),
            helper,
        });
        let mut state = self.state.lock();
        state.runs.push(spec.clone());
        if state.fail_run && !helper {
            return Err(ContainerError::Runtime("run refused".to_string()));
        }
        state.next_id += 1;
        let id = if helper {
            ContainerId::new(format!("helper-{}", state.next_id))
        } else {
            ContainerId::new(format!("new-{}", state.next_id))
        };
        if !helper {
            let name = spec.name.clone().unwrap_or_else(|| id.to_string());
            state.containers.push(ContainerInfo {
                id: id.clone(),
                name,
                image: spec.image.to_string(),
                image_id: ImageId::new(format!("sha256:{}", spec.image)),
                state: ContainerState::Running,
                health: None,
                labels: spec.labels.clone(),
                env: spec.env.clone(),
                command: spec.command.clone(),
                mounts: Vec::new(),
                port_bindings: spec.port_bindings.clone(),
                restart_policy: spec.restart_policy.clone(),
            });
        }
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.record(Call::Start(id.to_string()));
        let mut state = self.state.lock();
        let info = state
            .containers
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if info.state == ContainerState::Running {
            return Err(ContainerError::AlreadyRunning(id.to_string()));
        }
        info.state = ContainerState::Running;
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Option<Duration>,
    ) -> Result<(), ContainerError> {
        self.record(Call::Stop(id.to_string()));
        let mut state = self.state.lock();
        if state.fail_stop.contains(id.as_str()) {
            return Err(ContainerError::Runtime("stop refused".to_string()));
        }
        let info = state
            .containers
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if info.state != ContainerState::Running {
            return Err(ContainerError::NotRunning(id.to_string()));
        }
        info.state = ContainerState::Exited;
        Ok(())
    }

    async fn update_restart_policy(
        &self,
        id: &ContainerId,
        policy: &RestartPolicyConfig,
    ) -> Result<(), ContainerError> {
        self.record(Call::UpdateRestart(id.to_string(), policy.clone()));
        let mut state = self.state.lock();
        if state.fail_update_restart {
            return Err(ContainerError::Runtime("update refused".to_string()));
        }
        let info = state
            .containers
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        info.restart_policy = policy.clone();
        Ok(())
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        self.record(Call::Wait(id.to_string()));
        Ok(self.state.lock().exit_codes.pop_front().unwrap_or(0))
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        self.record(Call::List);
        let state = self.state.lock();
        Ok(state
            .containers
            .iter()
            .filter(|c| filters.all || c.is_running())
            .filter(|c| filters.labels.iter().all(|(k, v)| c.has_label(k, v)))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                state: format!("{:?}", c.state).to_lowercase(),
                labels: c.labels.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl ImageOps for MockRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        self.record(Call::Pull(reference.to_string()));
        let gate = self.pull_gate.lock().clone();
        if let Some(gate) = gate {
            // Closing the semaphore releases every waiter
            let _ = gate.acquire().await;
        }
        if self.state.lock().fail_pull.contains(&reference.to_string()) {
            return Err(ImageError::PullFailed(reference.to_string()));
        }
        Ok(())
    }

    async fn inspect_image(&self, reference: &ImageRef) -> Result<ImageId, ImageError> {
        self.record(Call::InspectImage(reference.to_string()));
        let state = self.state.lock();
        Ok(state
            .image_ids
            .get(&reference.to_string())
            .cloned()
            .unwrap_or_else(|| ImageId::new(format!("sha256:{}", reference))))
    }
}

#[async_trait]
impl VolumeOps for MockRuntime {
    async fn create_volume(
        &self,
        name: &VolumeName,
        labels: &HashMap<String, String>,
    ) -> Result<VolumeInfo, VolumeError> {
        self.record(Call::CreateVolume(name.to_string()));
        let mut state = self.state.lock();
        if state.volumes.contains_key(name.as_str()) {
            return Err(VolumeError::AlreadyExists(name.to_string()));
        }
        state.volumes.insert(name.to_string(), labels.clone());
        Ok(VolumeInfo {
            name: name.clone(),
            labels: labels.clone(),
        })
    }
}
