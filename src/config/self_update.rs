// ABOUTME: Settings for the periodic self-update loop.
// ABOUTME: Target image, schedule, pulls, health wait and naming.

use crate::runtime::HealthWait;
use crate::types::ImageRef;
use crate::upgrade::ReplacementOrder;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelfUpdateConfig {
    /// Image to keep this container on. When unset, the reference the
    /// container was created from is pulled again.
    pub image: Option<ImageRef>,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    pub disable_pull: bool,

    /// Run a check immediately instead of waiting one interval.
    pub check_on_start: bool,

    #[serde(with = "humantime_serde")]
    pub health_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub health_poll_interval: Duration,

    pub container_name_prefix: String,

    /// Name or id of this container. Defaults to the hostname, which the
    /// runtime sets to the short container id.
    pub hostname: Option<String>,

    /// Only `start-then-stop` is accepted.
    pub order: ReplacementOrder,
}

impl SelfUpdateConfig {
    pub fn health_wait(&self) -> HealthWait {
        HealthWait {
            timeout: self.health_timeout,
            poll_interval: self.health_poll_interval,
        }
    }
}

impl Default for SelfUpdateConfig {
    fn default() -> Self {
        let wait = HealthWait::default();
        SelfUpdateConfig {
            image: None,
            interval: Duration::from_secs(24 * 60 * 60),
            disable_pull: false,
            check_on_start: false,
            health_timeout: wait.timeout,
            health_poll_interval: wait.poll_interval,
            container_name_prefix: "upshift".to_string(),
            hostname: None,
            order: ReplacementOrder::StartThenStop,
        }
    }
}
