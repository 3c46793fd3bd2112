// ABOUTME: In-place upgrade of a managed container with volume backup.
// ABOUTME: Exports the orchestrator, backup engine, job log, states and errors.

mod backup;
mod error;
mod journal;
mod orchestrator;
mod state;
mod strategy;

pub use backup::{
    BACKUP_HELPER_LABEL_VALUE, BackupOptions, BackupRecord, VERSION_LABELS, backup_volume_name,
    backup_volumes,
};
pub use error::{ContainerErrorExt, ImageErrorExt, UpgradeError, UpgradeErrorKind};
pub use journal::JobLog;
pub use orchestrator::{UpgradeRequest, Upgrader, replacement_spec};
pub(crate) use orchestrator::discard_replacement;
pub use state::{UpgradeReport, UpgradeState};
pub use strategy::ReplacementOrder;

use chrono::{DateTime, Utc};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Timestamp used in generated volume and container names.
pub fn name_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d-%H-%M-%S").to_string()
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, E, F>(cancel: &CancellationToken, cancelled: E, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled),
        result = fut => result,
    }
}
