// ABOUTME: Diagnostics accumulator for non-fatal warnings during upgrades.
// ABOUTME: Collects cleanup failures that shouldn't fail a job but must be reported.

use serde::Serialize;

/// Collects non-fatal warnings during upgrade operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// The old container's restart policy could not be disabled.
    pub fn restart_policy_disable(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RestartPolicyDisable,
            message: message.into(),
        }
    }

    /// The superseded container could not be stopped.
    pub fn stop_superseded(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StopSuperseded,
            message: message.into(),
        }
    }

    /// A failed replacement could not be cleaned up.
    pub fn replacement_cleanup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ReplacementCleanup,
            message: message.into(),
        }
    }

    /// The local API server could not be restarted.
    pub fn api_server_restart(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ApiServerRestart,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Old container may come back on daemon restart.
    RestartPolicyDisable,
    /// Old container is still running next to its replacement.
    StopSuperseded,
    /// Unhealthy replacement may still be running or restartable.
    ReplacementCleanup,
    /// API server stayed down after a failed self-update.
    ApiServerRestart,
}
