// ABOUTME: Copies each named volume of a container into a fresh backup volume.
// ABOUTME: Uses a short-lived helper container per volume; aborts on the first failure.

use super::error::{ImageErrorExt, UpgradeError};
use super::journal::JobLog;
use super::{cancellable, name_timestamp};
use crate::runtime::{ContainerInfo, FullRuntime, MountInfo, RunSpec, VolumeMount};
use crate::types::{ImageRef, Provenance, VolumeName};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Labels copied from the source container onto backup volumes.
pub const VERSION_LABELS: [&str; 2] = [
    "org.label-schema.version",
    "org.opencontainers.image.version",
];

/// Provenance value carried by helper containers.
pub const BACKUP_HELPER_LABEL_VALUE: &str = "backup-helper";

const SOURCE_MOUNT: &str = "/srv-original";
const BACKUP_MOUNT: &str = "/srv-backup";

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub provenance: Provenance,
    /// Image for the copy helper.
    pub backup_image: ImageRef,
    /// Pull the helper image before the first copy.
    pub pull_image: bool,
}

/// One completed volume copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub source: VolumeName,
    pub backup: VolumeName,
    /// Where the source is mounted in the container.
    pub destination: String,
}

/// Name of the backup of `source` taken at `timestamp`.
pub fn backup_volume_name(source: &str, timestamp: &str) -> VolumeName {
    VolumeName::new(format!("{}-backup-{}", source, timestamp))
}

/// Back up every named volume mounted into `container`, in mount order.
///
/// Bind mounts are skipped. The first failure aborts: backups already taken
/// stay, later volumes are not attempted. The container itself is never
/// stopped or started here.
pub async fn backup_volumes<R: FullRuntime + ?Sized>(
    runtime: &R,
    container: &ContainerInfo,
    options: &BackupOptions,
    log: &JobLog,
    cancel: &CancellationToken,
) -> Result<Vec<BackupRecord>, UpgradeError> {
    let volumes: Vec<(&MountInfo, &str)> = container
        .volume_mounts()
        .filter_map(|m| m.name.as_deref().map(|name| (m, name)))
        .collect();

    if volumes.is_empty() {
        log.line("No volumes to back up");
        return Ok(Vec::new());
    }

    if options.pull_image {
        log.line(format!("Pulling backup helper image {}", options.backup_image));
        cancellable(
            cancel,
            UpgradeError::Cancelled,
            async { runtime.pull_image(&options.backup_image).await.pulling(&options.backup_image) },
        )
        .await?;
    }

    let timestamp = name_timestamp(chrono::Utc::now());
    let labels = backup_labels(container, &options.provenance, &timestamp);

    let mut records = Vec::with_capacity(volumes.len());
    for (mount, source) in volumes {
        let backup = backup_volume_name(source, &timestamp);
        log.line(format!("Backing up volume {} to {}", source, backup));

        copy_volume(runtime, source, &backup, &labels, options, cancel).await?;

        log.line(format!("Volume {} backed up", source));
        records.push(BackupRecord {
            source: VolumeName::new(source),
            backup,
            destination: mount.destination.clone(),
        });
    }

    Ok(records)
}

fn backup_labels(
    container: &ContainerInfo,
    provenance: &Provenance,
    timestamp: &str,
) -> HashMap<String, String> {
    let mut labels = HashMap::from([
        (provenance.key.clone(), provenance.value.clone()),
        (provenance.created_key(), timestamp.to_string()),
    ]);
    for key in VERSION_LABELS {
        if let Some(value) = container.labels.get(key) {
            labels.insert(key.to_string(), value.clone());
        }
    }
    labels
}

async fn copy_volume<R: FullRuntime + ?Sized>(
    runtime: &R,
    source: &str,
    backup: &VolumeName,
    labels: &HashMap<String, String>,
    options: &BackupOptions,
    cancel: &CancellationToken,
) -> Result<(), UpgradeError> {
    let failed = |reason: String| UpgradeError::VolumeBackup {
        volume: source.to_string(),
        reason,
    };

    runtime
        .create_volume(backup, labels)
        .await
        .map_err(|e| failed(format!("creating {}: {}", backup, e)))?;

    let mut spec = RunSpec::new(options.backup_image.clone());
    spec.command = Some(
        ["cp", "-prT", SOURCE_MOUNT, BACKUP_MOUNT]
            .map(String::from)
            .to_vec(),
    );
    spec.labels = HashMap::from([(
        options.provenance.key.clone(),
        BACKUP_HELPER_LABEL_VALUE.to_string(),
    )]);
    spec.volumes = vec![
        VolumeMount {
            source: VolumeName::new(source),
            target: SOURCE_MOUNT.to_string(),
            read_only: true,
        },
        VolumeMount {
            source: backup.clone(),
            target: BACKUP_MOUNT.to_string(),
            read_only: false,
        },
    ];
    spec.auto_remove = true;

    let helper = runtime
        .run_container(&spec)
        .await
        .map_err(|e| failed(format!("starting helper container: {}", e)))?;
    tracing::debug!(helper = %helper, volume = source, "backup helper started");

    let exit_code = cancellable(cancel, UpgradeError::Cancelled, async {
        runtime
            .wait_container(&helper)
            .await
            .map_err(|e| failed(format!("waiting for helper container: {}", e)))
    })
    .await?;

    if exit_code != 0 {
        return Err(failed(format!("helper container exited with code {}", exit_code)));
    }

    Ok(())
}
