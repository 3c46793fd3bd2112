// ABOUTME: Settings for service upgrades and the volume backup they perform.
// ABOUTME: Target image, naming, ordering, pulls, stop timeout and health wait.

use crate::runtime::HealthWait;
use crate::types::ImageRef;
use crate::upgrade::ReplacementOrder;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpgradeConfig {
    /// Image to upgrade to. When unset, the reference the running container
    /// was created from is pulled again.
    pub image: Option<ImageRef>,

    /// Prefix for generated replacement names (`<prefix>-<timestamp>`).
    pub container_name_prefix: String,

    pub order: ReplacementOrder,

    /// Skip pulling the target and helper images.
    pub disable_pull: bool,

    /// Image for the short-lived volume copy containers.
    pub backup_image: ImageRef,

    /// Grace period when stopping the old container. Unset waits for the
    /// container to exit on its own.
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub health_poll_interval: Duration,
}

impl UpgradeConfig {
    pub fn health_wait(&self) -> HealthWait {
        HealthWait {
            timeout: self.health_timeout,
            poll_interval: self.health_poll_interval,
        }
    }
}

pub(crate) fn default_backup_image() -> ImageRef {
    ImageRef::from_parts("alpine", "3")
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        let wait = HealthWait::default();
        UpgradeConfig {
            image: None,
            container_name_prefix: "upshift-server".to_string(),
            order: ReplacementOrder::StopThenStart,
            disable_pull: false,
            backup_image: default_backup_image(),
            stop_timeout: None,
            health_timeout: wait.timeout,
            health_poll_interval: wait.poll_interval,
        }
    }
}
