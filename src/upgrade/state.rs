// ABOUTME: Upgrade progress states and the terminal report of a job.
// ABOUTME: Each state names the last step that completed.

use super::error::UpgradeError;
use crate::diagnostics::Warning;
use crate::types::ContainerId;
use std::fmt;

/// Last completed step of an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeState {
    /// Target inspected and accepted.
    Validated,
    /// Target image available locally.
    ImagePulled,
    /// Old container stopped.
    OldStopped,
    /// Every named volume copied.
    VolumesBackedUp,
    /// Replacement created and started.
    ReplacementStarted { container: ContainerId },
    /// Replacement reported healthy.
    ReplacementHealthy { container: ContainerId },
    /// Old container will not come back; the replacement serves.
    OldRetired { container: ContainerId },
}

impl UpgradeState {
    pub fn name(&self) -> &'static str {
        match self {
            UpgradeState::Validated => "validated",
            UpgradeState::ImagePulled => "image-pulled",
            UpgradeState::OldStopped => "old-stopped",
            UpgradeState::VolumesBackedUp => "volumes-backed-up",
            UpgradeState::ReplacementStarted { .. } => "replacement-started",
            UpgradeState::ReplacementHealthy { .. } => "replacement-healthy",
            UpgradeState::OldRetired { .. } => "old-retired",
        }
    }

    /// Replacement container, once one exists.
    pub fn replacement(&self) -> Option<&ContainerId> {
        match self {
            UpgradeState::ReplacementStarted { container }
            | UpgradeState::ReplacementHealthy { container }
            | UpgradeState::OldRetired { container } => Some(container),
            _ => None,
        }
    }
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.replacement() {
            Some(container) => write!(f, "{}({})", self.name(), container.short()),
            None => f.write_str(self.name()),
        }
    }
}

/// Outcome of one upgrade job.
#[derive(Debug)]
pub struct UpgradeReport {
    pub state: UpgradeState,
    pub new_container: Option<ContainerId>,
    pub warnings: Vec<Warning>,
    pub error: Option<UpgradeError>,
}

impl UpgradeReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
