// ABOUTME: Polls a container until its health check reports healthy.
// ABOUTME: Bounded by a timeout and raced against a cancellation token.

use super::traits::{ContainerError, ContainerOps, ContainerState, HealthState};
use crate::types::ContainerId;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How long and how often to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthWait {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for HealthWait {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HealthWaitError {
    #[error("container did not become healthy within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("inspecting container failed: {0}")]
    Inspect(#[source] ContainerError),

    #[error("container exited before becoming healthy ({0:?})")]
    Exited(ContainerState),

    #[error("cancelled")]
    Cancelled,
}

/// Wait until `id` reports healthy.
///
/// A container without a health check counts as healthy as soon as it is
/// inspected. When the wait ends, no further inspect calls are made.
pub async fn wait_for_healthy<R: ContainerOps + ?Sized>(
    runtime: &R,
    id: &ContainerId,
    wait: HealthWait,
    cancel: &CancellationToken,
) -> Result<(), HealthWaitError> {
    let poll = async {
        loop {
            let info = runtime
                .inspect_container(id)
                .await
                .map_err(HealthWaitError::Inspect)?;

            if matches!(info.state, ContainerState::Exited | ContainerState::Dead) {
                return Err(HealthWaitError::Exited(info.state));
            }

            match info.health {
                None | Some(HealthState::None) | Some(HealthState::Healthy) => return Ok(()),
                Some(state) => {
                    tracing::debug!(container = %id, ?state, "waiting for container to become healthy");
                }
            }

            tokio::time::sleep(wait.poll_interval).await;
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HealthWaitError::Cancelled),
        result = tokio::time::timeout(wait.timeout, poll) => {
            result.unwrap_or(Err(HealthWaitError::Timeout(wait.timeout)))
        }
    }
}
