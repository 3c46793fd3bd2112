// ABOUTME: Error types for upgrade operations.
// ABOUTME: Precondition, pull, stop, backup, start and health failures with context.

use crate::runtime::{ContainerError, HealthWaitError, ImageError};
use crate::types::ImageRef;

/// Errors that end an upgrade, or refuse to start one.
#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    /// Target is missing or not running.
    #[error("container {container} is not running")]
    ContainerNotRunning { container: String },

    /// Inspecting the target failed for a reason other than absence.
    #[error("failed to inspect container {container}: {source}")]
    Inspect {
        container: String,
        #[source]
        source: ContainerError,
    },

    /// Target lacks the provenance label.
    #[error("container {container} was not installed by upshift (missing label {label})")]
    NotInstalledByTool { container: String, label: String },

    /// Target already has an upgrade in flight.
    #[error("an upgrade of container {container} is already in progress")]
    AlreadyInProgress { container: String },

    /// Target image reference could not be determined.
    #[error("invalid target image '{image}': {reason}")]
    InvalidImage { image: String, reason: String },

    /// Job log could not be created.
    #[error("failed to create job log: {0}")]
    JobLog(#[source] std::io::Error),

    #[error("failed to pull image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: ImageError,
    },

    #[error("failed to stop container {container}: {source}")]
    ContainerStop {
        container: String,
        #[source]
        source: ContainerError,
    },

    /// Copying a volume failed; later volumes were not attempted.
    #[error("failed to back up volume {volume}: {reason}")]
    VolumeBackup { volume: String, reason: String },

    #[error("failed to start container from {image}: {source}")]
    ContainerStart {
        image: String,
        #[source]
        source: ContainerError,
    },

    #[error("container {container} did not become healthy within {timeout_secs} seconds")]
    HealthCheckTimeout { container: String, timeout_secs: u64 },

    #[error("health check of container {container} failed: {reason}")]
    HealthCheckFailed { container: String, reason: String },

    #[error("upgrade cancelled")]
    Cancelled,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeErrorKind {
    ContainerNotRunning,
    Inspect,
    NotInstalledByTool,
    AlreadyInProgress,
    InvalidImage,
    JobLog,
    ImagePull,
    ContainerStop,
    VolumeBackup,
    ContainerStart,
    HealthCheckTimeout,
    HealthCheckFailed,
    Cancelled,
}

impl UpgradeError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> UpgradeErrorKind {
        match self {
            UpgradeError::ContainerNotRunning { .. } => UpgradeErrorKind::ContainerNotRunning,
            UpgradeError::Inspect { .. } => UpgradeErrorKind::Inspect,
            UpgradeError::NotInstalledByTool { .. } => UpgradeErrorKind::NotInstalledByTool,
            UpgradeError::AlreadyInProgress { .. } => UpgradeErrorKind::AlreadyInProgress,
            UpgradeError::InvalidImage { .. } => UpgradeErrorKind::InvalidImage,
            UpgradeError::JobLog(_) => UpgradeErrorKind::JobLog,
            UpgradeError::ImagePull { .. } => UpgradeErrorKind::ImagePull,
            UpgradeError::ContainerStop { .. } => UpgradeErrorKind::ContainerStop,
            UpgradeError::VolumeBackup { .. } => UpgradeErrorKind::VolumeBackup,
            UpgradeError::ContainerStart { .. } => UpgradeErrorKind::ContainerStart,
            UpgradeError::HealthCheckTimeout { .. } => UpgradeErrorKind::HealthCheckTimeout,
            UpgradeError::HealthCheckFailed { .. } => UpgradeErrorKind::HealthCheckFailed,
            UpgradeError::Cancelled => UpgradeErrorKind::Cancelled,
        }
    }

    /// Whether the error was returned before any job was created.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self.kind(),
            UpgradeErrorKind::ContainerNotRunning
                | UpgradeErrorKind::Inspect
                | UpgradeErrorKind::NotInstalledByTool
                | UpgradeErrorKind::AlreadyInProgress
                | UpgradeErrorKind::InvalidImage
                | UpgradeErrorKind::JobLog
        )
    }

    /// Convert a failed health wait on `container`.
    pub fn from_health(container: &str, err: HealthWaitError) -> Self {
        match err {
            HealthWaitError::Timeout(timeout) => UpgradeError::HealthCheckTimeout {
                container: container.to_string(),
                timeout_secs: timeout.as_secs(),
            },
            HealthWaitError::Cancelled => UpgradeError::Cancelled,
            other => UpgradeError::HealthCheckFailed {
                container: container.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Attach step context to container errors.
pub trait ContainerErrorExt<T> {
    fn stopping(self, container: &str) -> Result<T, UpgradeError>;
    fn starting(self, image: &ImageRef) -> Result<T, UpgradeError>;
}

impl<T> ContainerErrorExt<T> for Result<T, ContainerError> {
    fn stopping(self, container: &str) -> Result<T, UpgradeError> {
        self.map_err(|source| UpgradeError::ContainerStop {
            container: container.to_string(),
            source,
        })
    }

    fn starting(self, image: &ImageRef) -> Result<T, UpgradeError> {
        self.map_err(|source| UpgradeError::ContainerStart {
            image: image.to_string(),
            source,
        })
    }
}

/// Attach step context to image errors.
pub trait ImageErrorExt<T> {
    fn pulling(self, image: &ImageRef) -> Result<T, UpgradeError>;
}

impl<T> ImageErrorExt<T> for Result<T, ImageError> {
    fn pulling(self, image: &ImageRef) -> Result<T, UpgradeError> {
        self.map_err(|source| UpgradeError::ImagePull {
            image: image.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn health_timeout_keeps_duration() {
        let err = UpgradeError::from_health("abc", HealthWaitError::Timeout(Duration::from_secs(30)));
        assert_eq!(err.kind(), UpgradeErrorKind::HealthCheckTimeout);
        assert!(err.to_string().contains("30 seconds"));
    }

    #[test]
    fn health_inspect_error_is_failure() {
        let err = UpgradeError::from_health(
            "abc",
            HealthWaitError::Inspect(ContainerError::NotFound("abc".to_string())),
        );
        assert_eq!(err.kind(), UpgradeErrorKind::HealthCheckFailed);
    }

    #[test]
    fn stopping_wraps_with_container() {
        let result: Result<(), _> = Err(ContainerError::Runtime("boom".to_string()));
        let err = result.stopping("server").unwrap_err();
        assert_eq!(err.kind(), UpgradeErrorKind::ContainerStop);
        assert!(err.to_string().contains("server"));
    }

    #[test]
    fn precondition_errors_are_flagged() {
        let err = UpgradeError::AlreadyInProgress {
            container: "x".to_string(),
        };
        assert!(err.is_precondition());
        assert!(!UpgradeError::Cancelled.is_precondition());
    }
}
