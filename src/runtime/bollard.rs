// ABOUTME: Bollard-based container runtime implementation.
// ABOUTME: Supports both Docker and Podman via Docker-compatible API.

use crate::runtime::traits::{
    ContainerError, ContainerFilters, ContainerInfo, ContainerOps, ContainerState,
    ContainerSummary, HealthState, ImageError, ImageOps, MountInfo, MountKind, PortBinding,
    PortBindings, RestartPolicyConfig, RunSpec, VolumeError, VolumeInfo, VolumeOps,
};
use crate::runtime::types::{ConnectionError, RuntimeInfo, RuntimeType};
use crate::types::{ContainerId, ImageId, ImageRef, VolumeName};
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerCreateBody, ContainerStateStatusEnum, ContainerUpdateBody, ContainerWaitExitError,
    ContainerWaitResponse, HealthStatusEnum,
    HostConfig, Mount, MountPointTypeEnum, MountTypeEnum, RestartPolicy, RestartPolicyNameEnum,
    VolumeCreateRequest,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn status_of(e: &BollardError) -> Option<(u16, &str)> {
    match e {
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => Some((*status_code, message.as_str())),
        _ => None,
    }
}

fn map_container_create_error(e: BollardError) -> ContainerError {
    match status_of(&e) {
        Some((404, message)) => ContainerError::ImageNotFound(message.to_string()),
        Some((409, message)) => ContainerError::AlreadyExists(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: BollardError) -> ContainerError {
    match status_of(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        Some((304, message)) => ContainerError::AlreadyRunning(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_stop_error(e: BollardError) -> ContainerError {
    match status_of(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        Some((304, message)) => ContainerError::NotRunning(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: BollardError) -> ContainerError {
    match status_of(&e) {
        Some((404, message)) => ContainerError::NotFound(message.to_string()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

/// Exit code from the first item of a wait stream. A wait that reports an
/// error message fails, whatever the exit code.
fn wait_outcome(
    id: &ContainerId,
    item: Option<Result<ContainerWaitResponse, BollardError>>,
) -> Result<i64, ContainerError> {
    match item {
        Some(Ok(ContainerWaitResponse {
            error:
                Some(ContainerWaitExitError {
                    message: Some(message),
                }),
            ..
        })) if !message.is_empty() => {
            Err(ContainerError::WaitFailed(format!("{}: {}", id, message)))
        }
        Some(Ok(response)) => Ok(response.status_code),
        // bollard reports a non-zero exit as an error carrying the code
        Some(Err(BollardError::DockerContainerWaitError { error, code })) => {
            if error.is_empty() {
                Ok(code)
            } else {
                Err(ContainerError::WaitFailed(format!(
                    "{}: {} (exit code {})",
                    id, error, code
                )))
            }
        }
        Some(Err(e)) => Err(map_container_not_found_error(e)),
        None => Err(ContainerError::WaitFailed(format!(
            "{}: wait stream ended without a status",
            id
        ))),
    }
}

fn map_image_error(e: BollardError, image_name: &str) -> ImageError {
    match status_of(&e) {
        Some((404, _)) => ImageError::NotFound(image_name.to_string()),
        _ => ImageError::Runtime(format!("{}: {}", image_name, e)),
    }
}

fn to_restart_policy(policy: &RestartPolicyConfig) -> RestartPolicy {
    RestartPolicy {
        name: Some(match policy {
            RestartPolicyConfig::No => RestartPolicyNameEnum::NO,
            RestartPolicyConfig::Always => RestartPolicyNameEnum::ALWAYS,
            RestartPolicyConfig::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
            RestartPolicyConfig::OnFailure { .. } => RestartPolicyNameEnum::ON_FAILURE,
        }),
        maximum_retry_count: match policy {
            RestartPolicyConfig::OnFailure { max_retries } => max_retries.map(i64::from),
            _ => None,
        },
    }
}

fn from_restart_policy(policy: Option<&RestartPolicy>) -> RestartPolicyConfig {
    let Some(policy) = policy else {
        return RestartPolicyConfig::No;
    };
    match policy.name {
        Some(RestartPolicyNameEnum::ALWAYS) => RestartPolicyConfig::Always,
        Some(RestartPolicyNameEnum::UNLESS_STOPPED) => RestartPolicyConfig::UnlessStopped,
        Some(RestartPolicyNameEnum::ON_FAILURE) => RestartPolicyConfig::OnFailure {
            max_retries: policy
                .maximum_retry_count
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok()),
        },
        _ => RestartPolicyConfig::No,
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container runtime implementation using bollard.
///
/// Supports both Docker and Podman via Docker-compatible API.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    /// Create a new BollardRuntime from a Docker client.
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Connect to a container runtime using detected runtime info.
    ///
    /// Use with `detect_runtime()` to find the socket.
    pub fn connect(info: &RuntimeInfo) -> Result<Self, ConnectionError> {
        let client =
            Docker::connect_with_unix(&info.socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(client, info.runtime_type))
    }

    /// Check that the daemon answers.
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.client
            .ping()
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }

    /// Get the runtime type (Docker or Podman).
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError> {
        let image_name = reference.to_string();

        let opts = CreateImageOptions {
            from_image: Some(image_name.clone()),
            ..Default::default()
        };

        // Pull returns a stream of progress updates - consume it
        let mut stream = self.client.create_image(Some(opts), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|e| ImageError::PullFailed(format!("{}: {}", image_name, e)))?;
        }

        Ok(())
    }

    async fn inspect_image(&self, reference: &ImageRef) -> Result<ImageId, ImageError> {
        let image_name = reference.to_string();

        let details = self
            .client
            .inspect_image(&image_name)
            .await
            .map_err(|e| map_image_error(e, &image_name))?;

        details
            .id
            .map(ImageId::new)
            .ok_or_else(|| ImageError::Runtime(format!("{}: image has no id", image_name)))
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        // Parse state
        let state = details
            .state
            .as_ref()
            .and_then(|s| s.status)
            .map(|s| match s {
                ContainerStateStatusEnum::CREATED => ContainerState::Created,
                ContainerStateStatusEnum::RUNNING => ContainerState::Running,
                ContainerStateStatusEnum::PAUSED => ContainerState::Paused,
                ContainerStateStatusEnum::RESTARTING => ContainerState::Restarting,
                ContainerStateStatusEnum::REMOVING => ContainerState::Removing,
                ContainerStateStatusEnum::DEAD => ContainerState::Dead,
                _ => ContainerState::Exited,
            })
            .unwrap_or(ContainerState::Exited);

        // Parse health status
        let health = details
            .state
            .as_ref()
            .and_then(|s| s.health.as_ref())
            .and_then(|h| h.status)
            .map(|s| match s {
                HealthStatusEnum::STARTING => HealthState::Starting,
                HealthStatusEnum::HEALTHY => HealthState::Healthy,
                HealthStatusEnum::UNHEALTHY => HealthState::Unhealthy,
                _ => HealthState::None,
            });

        let mounts = details
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountInfo {
                kind: match m.typ {
                    Some(MountPointTypeEnum::VOLUME) => MountKind::Volume,
                    Some(MountPointTypeEnum::BIND) => MountKind::Bind,
                    _ => MountKind::Other,
                },
                name: m.name,
                source: m.source.unwrap_or_default(),
                destination: m.destination.unwrap_or_default(),
                read_only: !m.rw.unwrap_or(true),
            })
            .collect();

        let host_config = details.host_config.unwrap_or_default();
        let port_bindings: PortBindings = host_config
            .port_bindings
            .unwrap_or_default()
            .into_iter()
            .map(|(port, bindings)| {
                let bindings = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| PortBinding {
                        host_ip: b.host_ip,
                        host_port: b.host_port,
                    })
                    .collect();
                (port, bindings)
            })
            .collect();

        let config = details.config.unwrap_or_default();

        Ok(ContainerInfo {
            id: ContainerId::new(details.id.unwrap_or_else(|| id.to_string())),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: config.image.unwrap_or_default(),
            image_id: ImageId::new(details.image.unwrap_or_default()),
            state,
            health,
            labels: config.labels.unwrap_or_default(),
            env: config.env.unwrap_or_default(),
            command: config.cmd,
            mounts,
            port_bindings,
            restart_policy: from_restart_policy(host_config.restart_policy.as_ref()),
        })
    }

    async fn run_container(&self, spec: &RunSpec) -> Result<ContainerId, ContainerError> {
        let mounts: Vec<Mount> = spec
            .volumes
            .iter()
            .map(|m| Mount {
                source: Some(m.source.to_string()),
                target: Some(m.target.clone()),
                typ: Some(MountTypeEnum::VOLUME),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let port_bindings: HashMap<String, Option<Vec<bollard::models::PortBinding>>> = spec
            .port_bindings
            .iter()
            .map(|(port, bindings)| {
                let bindings = bindings
                    .iter()
                    .map(|b| bollard::models::PortBinding {
                        host_ip: b.host_ip.clone(),
                        host_port: b.host_port.clone(),
                    })
                    .collect();
                (port.clone(), Some(bindings))
            })
            .collect();
        let exposed_ports: Vec<String> = port_bindings.keys().cloned().collect();

        let host_config = HostConfig {
            restart_policy: Some(to_restart_policy(&spec.restart_policy)),
            mounts: (!mounts.is_empty()).then_some(mounts),
            volumes_from: (!spec.volumes_from.is_empty())
                .then(|| spec.volumes_from.iter().map(|id| id.to_string()).collect()),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            auto_remove: Some(spec.auto_remove),
            ..Default::default()
        };

        let container_config = ContainerCreateBody {
            image: Some(spec.image.to_string()),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
            cmd: spec.command.clone(),
            host_config: Some(host_config),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), container_config)
            .await
            .map_err(map_container_create_error)?;
        let id = ContainerId::new(response.id);

        self.start_container(&id).await?;
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(id.as_str(), None::<StartContainerOptions>)
            .await
            .map_err(map_container_start_error)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Option<Duration>,
    ) -> Result<(), ContainerError> {
        // -1 tells the daemon to wait indefinitely after SIGTERM
        let t = timeout.map_or(-1, |d| i32::try_from(d.as_secs()).unwrap_or(i32::MAX));
        let opts = StopContainerOptions {
            t: Some(t),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_stop_error)
    }

    async fn update_restart_policy(
        &self,
        id: &ContainerId,
        policy: &RestartPolicyConfig,
    ) -> Result<(), ContainerError> {
        let body = ContainerUpdateBody {
            restart_policy: Some(to_restart_policy(policy)),
            ..Default::default()
        };

        self.client
            .update_container(id.as_str(), body)
            .await
            .map_err(map_container_not_found_error)
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        let opts = WaitContainerOptions {
            condition: "not-running".to_string(),
        };

        let mut stream = self.client.wait_container(id.as_str(), Some(opts));
        wait_outcome(id, stream.next().await)
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in &filters.labels {
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(format!("{}={}", key, value));
        }

        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(opts))
            .await
            .map_err(|e| ContainerError::Runtime(e.to_string()))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();

                ContainerSummary {
                    id: ContainerId::new(c.id.unwrap_or_default()),
                    name,
                    image: c.image.unwrap_or_default(),
                    state: c
                        .state
                        .map(|s| format!("{:?}", s).to_lowercase())
                        .unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl VolumeOps for BollardRuntime {
    async fn create_volume(
        &self,
        name: &VolumeName,
        labels: &HashMap<String, String>,
    ) -> Result<VolumeInfo, VolumeError> {
        // The create endpoint is idempotent; look first so a name clash is an error.
        match self.client.inspect_volume(name.as_str()).await {
            Ok(_) => return Err(VolumeError::AlreadyExists(name.to_string())),
            Err(e) if matches!(status_of(&e), Some((404, _))) => {}
            Err(e) => return Err(VolumeError::Runtime(e.to_string())),
        }

        let opts = VolumeCreateRequest {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        };

        let volume = self
            .client
            .create_volume(opts)
            .await
            .map_err(|e| VolumeError::Runtime(e.to_string()))?;

        Ok(VolumeInfo {
            name: VolumeName::new(volume.name),
            labels: volume.labels,
        })
    }
}
