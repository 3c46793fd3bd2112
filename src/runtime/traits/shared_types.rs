// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: ContainerInfo, MountInfo, RunSpec, RestartPolicyConfig, VolumeInfo, etc.

use crate::types::{ContainerId, ImageId, ImageRef, VolumeName};
use serde::de::{self, Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Port bindings keyed by `"<port>/<proto>"`, as the runtime reports them.
pub type PortBindings = HashMap<String, Vec<PortBinding>>;

/// One host binding of a container port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortBinding {
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

/// Information about a container, as returned by inspect.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: ContainerId,
    /// Name without the leading slash.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Id of the image the container is running.
    pub image_id: ImageId,
    pub state: ContainerState,
    /// Health status; `None` when no healthcheck is configured.
    pub health: Option<HealthState>,
    pub labels: HashMap<String, String>,
    /// Environment in `KEY=value` form.
    pub env: Vec<String>,
    pub command: Option<Vec<String>>,
    pub mounts: Vec<MountInfo>,
    pub port_bindings: PortBindings,
    pub restart_policy: RestartPolicyConfig,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).is_some_and(|v| v == value)
    }

    /// Named volume mounts in the order the runtime reported them.
    pub fn volume_mounts(&self) -> impl Iterator<Item = &MountInfo> {
        self.mounts.iter().filter(|m| m.kind == MountKind::Volume)
    }
}

/// A mount attached to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub kind: MountKind,
    /// Volume name (named volumes only).
    pub name: Option<String>,
    pub source: String,
    pub destination: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Volume,
    Bind,
    Other,
}

/// Container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

/// Health state of a container with a healthcheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Healthy,
    Unhealthy,
    None,
}

/// Configuration for creating and starting a container.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Container name; the runtime generates one when absent.
    pub name: Option<String>,
    pub image: ImageRef,
    pub env: Vec<String>,
    pub command: Option<Vec<String>>,
    pub labels: HashMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    /// Containers whose volumes are mounted at the same paths.
    pub volumes_from: Vec<ContainerId>,
    pub port_bindings: PortBindings,
    pub restart_policy: RestartPolicyConfig,
    /// Remove the container once it exits.
    pub auto_remove: bool,
}

impl RunSpec {
    /// A spec with nothing but an image; callers fill in the rest.
    pub fn new(image: ImageRef) -> Self {
        Self {
            name: None,
            image,
            env: Vec::new(),
            command: None,
            labels: HashMap::new(),
            volumes: Vec::new(),
            volumes_from: Vec::new(),
            port_bindings: PortBindings::new(),
            restart_policy: RestartPolicyConfig::No,
            auto_remove: false,
        }
    }
}

/// A named volume mounted into a new container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: VolumeName,
    pub target: String,
    pub read_only: bool,
}

/// A volume as created by the runtime.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub name: VolumeName,
    pub labels: HashMap<String, String>,
}

/// Restart policy, written the way `docker run --restart` takes it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RestartPolicyConfig {
    #[default]
    No,
    Always,
    UnlessStopped,
    OnFailure {
        max_retries: Option<u32>,
    },
}

impl FromStr for RestartPolicyConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "no" => Ok(Self::No),
            "always" => Ok(Self::Always),
            "unless-stopped" => Ok(Self::UnlessStopped),
            "on-failure" => Ok(Self::OnFailure { max_retries: None }),
            _ => {
                let retries = s
                    .strip_prefix("on-failure:")
                    .ok_or_else(|| format!("unknown restart policy: {}", s))?;
                let max_retries = retries
                    .parse::<u32>()
                    .map_err(|_| format!("invalid max retries: {}", retries))?;
                Ok(Self::OnFailure {
                    max_retries: Some(max_retries),
                })
            }
        }
    }
}

impl fmt::Display for RestartPolicyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Always => write!(f, "always"),
            Self::UnlessStopped => write!(f, "unless-stopped"),
            Self::OnFailure { max_retries: None } => write!(f, "on-failure"),
            Self::OnFailure {
                max_retries: Some(n),
            } => write!(f, "on-failure:{}", n),
        }
    }
}

impl<'de> Deserialize<'de> for RestartPolicyConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
