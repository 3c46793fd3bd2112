// ABOUTME: Container operations trait for container runtimes.
// ABOUTME: Inspect, run, start, stop, update, wait for and list containers.

use super::shared_types::{ContainerInfo, RestartPolicyConfig, RunSpec};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Container lifecycle operations.
#[async_trait]
pub trait ContainerOps: Send + Sync {
    /// Get detailed information about a container (by id, id prefix or name).
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError>;

    /// Create and start a container in one step.
    async fn run_container(&self, spec: &RunSpec) -> Result<ContainerId, ContainerError>;

    /// Start a created or stopped container.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Stop a running container. `None` waits for the container to exit on
    /// its own after SIGTERM, however long that takes.
    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Option<Duration>,
    ) -> Result<(), ContainerError>;

    /// Replace a container's restart policy.
    async fn update_restart_policy(
        &self,
        id: &ContainerId,
        policy: &RestartPolicyConfig,
    ) -> Result<(), ContainerError>;

    /// Wait until the container is no longer running and return its exit code.
    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError>;

    /// List containers matching the given filters.
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Filter by label (key=value).
    pub labels: HashMap<String, String>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    /// Running containers carrying `key=value`.
    pub fn with_label(key: &str, value: &str) -> Self {
        Self {
            labels: HashMap::from([(key.to_string(), value.to_string())]),
            all: false,
        }
    }
}

/// Summary information about a container.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    /// Current state as reported by the runtime (`running`, `exited`, ...).
    pub state: String,
    pub labels: HashMap<String, String>,
}

/// Errors from container operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("container already running: {0}")]
    AlreadyRunning(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("waiting for container failed: {0}")]
    WaitFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
