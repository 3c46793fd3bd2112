// ABOUTME: Drives one upgrade of one managed container from validation to retirement.
// ABOUTME: Validates synchronously, then runs the job on a spawned task that logs every step.

use super::backup::{BackupOptions, backup_volumes};
use super::error::{ContainerErrorExt, ImageErrorExt, UpgradeError};
use super::journal::JobLog;
use super::state::{UpgradeReport, UpgradeState};
use super::strategy::ReplacementOrder;
use super::{cancellable, name_timestamp};
use crate::config::UpgradeConfig;
use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::{
    ContainerError, ContainerInfo, ContainerOps, FullRuntime, RestartPolicyConfig, RunSpec,
    wait_for_healthy,
};
use crate::status::{JobStatus, UpgradeStatusStore};
use crate::types::{ContainerId, ImageRef, LogToken, Provenance};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What to upgrade, and to what.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Target container id or name.
    pub container: ContainerId,
    /// Overrides the configured image.
    pub image: Option<ImageRef>,
    /// Overrides the generated `<prefix>-<timestamp>` name.
    pub new_container_name: Option<String>,
    /// Overrides the configured replacement order.
    pub order: Option<ReplacementOrder>,
}

impl UpgradeRequest {
    pub fn new(container: impl Into<ContainerId>) -> Self {
        Self {
            container: container.into(),
            image: None,
            new_container_name: None,
            order: None,
        }
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_new_container_name(mut self, name: impl Into<String>) -> Self {
        self.new_container_name = Some(name.into());
        self
    }

    pub fn with_order(mut self, order: ReplacementOrder) -> Self {
        self.order = Some(order);
        self
    }
}

/// Spec for a container replacing `old`: same labels, environment, command,
/// port bindings and restart policy, with `old`'s volumes mounted.
pub fn replacement_spec(old: &ContainerInfo, image: &ImageRef, name: String) -> RunSpec {
    let mut spec = RunSpec::new(image.clone());
    spec.name = Some(name);
    spec.env = old.env.clone();
    spec.command = old.command.clone();
    spec.labels = old.labels.clone();
    spec.volumes_from = vec![old.id.clone()];
    spec.port_bindings = old.port_bindings.clone();
    spec.restart_policy = old.restart_policy.clone();
    spec
}

/// Stop a replacement that failed verification and keep it from restarting.
pub(crate) async fn discard_replacement<R: ContainerOps + ?Sized>(
    runtime: &R,
    container: &ContainerId,
    stop_timeout: Option<Duration>,
) -> Vec<Warning> {
    let mut warnings = Vec::new();
    match runtime.stop_container(container, stop_timeout).await {
        Ok(()) | Err(ContainerError::NotRunning(_)) => {}
        Err(e) => warnings.push(Warning::replacement_cleanup(format!(
            "failed to stop unhealthy container {}: {}",
            container.short(),
            e
        ))),
    }
    if let Err(e) = runtime
        .update_restart_policy(container, &RestartPolicyConfig::No)
        .await
    {
        warnings.push(Warning::replacement_cleanup(format!(
            "failed to disable restart policy of unhealthy container {}: {}",
            container.short(),
            e
        )));
    }
    warnings
}

/// Deregisters a job when its task ends, however it ends.
struct Registration {
    store: Arc<UpgradeStatusStore>,
    token: LogToken,
    status: JobStatus,
}

impl Registration {
    fn succeed(&mut self) {
        self.status = JobStatus::Succeeded;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.store.finish(&self.token, self.status);
    }
}

/// Progress of a running job: current state plus collected warnings.
struct Job<'a> {
    log: &'a JobLog,
    state: UpgradeState,
    diagnostics: Diagnostics,
}

impl Job<'_> {
    fn advance(&mut self, next: UpgradeState) {
        self.log.line(format!("state: {} -> {}", self.state, next));
        self.state = next;
    }

    fn warn(&mut self, warning: Warning) {
        self.log.line(format!("Warning: {}", warning.message));
        self.diagnostics.warn(warning);
    }
}

/// Upgrades managed containers.
pub struct Upgrader<R> {
    runtime: Arc<R>,
    store: Arc<UpgradeStatusStore>,
    config: Arc<UpgradeConfig>,
    provenance: Arc<Provenance>,
}

impl<R> Clone for Upgrader<R> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            provenance: Arc::clone(&self.provenance),
        }
    }
}

impl<R: FullRuntime + 'static> Upgrader<R> {
    pub fn new(
        runtime: Arc<R>,
        store: Arc<UpgradeStatusStore>,
        config: UpgradeConfig,
        provenance: Provenance,
    ) -> Self {
        Self {
            runtime,
            store,
            config: Arc::new(config),
            provenance: Arc::new(provenance),
        }
    }

    /// Validate the request and start the upgrade in the background.
    ///
    /// Precondition failures are returned without creating a job. On success
    /// the returned token names the job log for
    /// [`UpgradeStatusStore::upgrade_status`].
    pub async fn start_upgrade(
        &self,
        request: UpgradeRequest,
        cancel: CancellationToken,
    ) -> Result<LogToken, UpgradeError> {
        let target = self.validate(&request).await?;
        self.target_image(&request, &target)?;

        let log = JobLog::create(&self.store.log_dir()).map_err(UpgradeError::JobLog)?;
        let token = log.token().clone();

        if !self.store.register(token.clone(), target.id.clone()) {
            // Lost a race with a concurrent request for the same target
            let path = log.path().to_path_buf();
            drop(log);
            let _ = std::fs::remove_file(path);
            return Err(UpgradeError::AlreadyInProgress {
                container: target.name.clone(),
            });
        }

        tracing::info!(token = %token, container = %target.id, "upgrade job registered");

        let this = self.clone();
        let mut registration = Registration {
            store: Arc::clone(&self.store),
            token: token.clone(),
            status: JobStatus::Failed,
        };
        tokio::spawn(async move {
            let report = this.run_upgrade(&target, &request, &log, &cancel).await;
            if report.succeeded() {
                registration.succeed();
            }
        });

        Ok(token)
    }

    async fn validate(&self, request: &UpgradeRequest) -> Result<ContainerInfo, UpgradeError> {
        let target = match self.runtime.inspect_container(&request.container).await {
            Ok(info) => info,
            Err(ContainerError::NotFound(_)) => {
                return Err(UpgradeError::ContainerNotRunning {
                    container: request.container.to_string(),
                });
            }
            Err(source) => {
                return Err(UpgradeError::Inspect {
                    container: request.container.to_string(),
                    source,
                });
            }
        };

        if !target.is_running() {
            return Err(UpgradeError::ContainerNotRunning {
                container: target.name.clone(),
            });
        }

        if !target.has_label(&self.provenance.key, &self.provenance.value) {
            return Err(UpgradeError::NotInstalledByTool {
                container: target.name.clone(),
                label: self.provenance.to_string(),
            });
        }

        if self.store.is_target_upgrading(&target.id) {
            return Err(UpgradeError::AlreadyInProgress {
                container: target.name.clone(),
            });
        }

        Ok(target)
    }

    fn target_image(
        &self,
        request: &UpgradeRequest,
        target: &ContainerInfo,
    ) -> Result<ImageRef, UpgradeError> {
        if let Some(image) = request.image.as_ref().or(self.config.image.as_ref()) {
            return Ok(image.clone());
        }
        ImageRef::parse(&target.image).map_err(|e| UpgradeError::InvalidImage {
            image: target.image.clone(),
            reason: e.to_string(),
        })
    }

    /// Run the upgrade of an already validated `target`, logging to `log`.
    ///
    /// Steps run strictly in sequence; the first error ends the job. Nothing
    /// is rolled back: the report names the last state reached.
    pub async fn run_upgrade(
        &self,
        target: &ContainerInfo,
        request: &UpgradeRequest,
        log: &JobLog,
        cancel: &CancellationToken,
    ) -> UpgradeReport {
        let mut job = Job {
            log,
            state: UpgradeState::Validated,
            diagnostics: Diagnostics::default(),
        };

        let result = match self.target_image(request, target) {
            Ok(image) => {
                let order = request.order.unwrap_or(self.config.order);
                let name = request.new_container_name.clone().unwrap_or_else(|| {
                    format!(
                        "{}-{}",
                        self.config.container_name_prefix,
                        name_timestamp(chrono::Utc::now())
                    )
                });
                log.line(format!(
                    "Upgrading container {} ({}) to {} using {}",
                    target.name,
                    target.id.short(),
                    image,
                    order
                ));
                match order {
                    ReplacementOrder::StopThenStart => {
                        self.stop_then_start(&mut job, target, &image, name, cancel)
                            .await
                    }
                    ReplacementOrder::StartThenStop => {
                        self.start_then_stop(&mut job, target, &image, name, cancel)
                            .await
                    }
                }
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => log.line(format!(
                "Upgrade of {} completed successfully",
                target.name
            )),
            Err(e) => {
                tracing::error!(container = %target.id, error = %e, "upgrade failed");
                log.line(format!("Upgrade failed: {}", e));
            }
        }

        UpgradeReport {
            new_container: job.state.replacement().cloned(),
            state: job.state,
            warnings: job.diagnostics.into_warnings(),
            error: result.err(),
        }
    }

    async fn stop_then_start(
        &self,
        job: &mut Job<'_>,
        target: &ContainerInfo,
        image: &ImageRef,
        name: String,
        cancel: &CancellationToken,
    ) -> Result<(), UpgradeError> {
        self.pull(job, image, cancel).await?;
        self.stop_old(job, target, cancel).await?;
        job.advance(UpgradeState::OldStopped);
        self.backup(job, target, cancel).await?;
        let replacement = self.start_replacement(job, target, image, name).await?;
        self.await_healthy(job, &replacement, cancel).await?;
        self.disable_old_restart(job, target).await;
        job.advance(UpgradeState::OldRetired {
            container: replacement,
        });
        Ok(())
    }

    async fn start_then_stop(
        &self,
        job: &mut Job<'_>,
        target: &ContainerInfo,
        image: &ImageRef,
        name: String,
        cancel: &CancellationToken,
    ) -> Result<(), UpgradeError> {
        self.pull(job, image, cancel).await?;
        self.backup(job, target, cancel).await?;
        let replacement = self.start_replacement(job, target, image, name).await?;

        if let Err(e) = self.await_healthy(job, &replacement, cancel).await {
            if !matches!(e, UpgradeError::Cancelled) {
                job.log.line(format!(
                    "Stopping unhealthy container {}; {} keeps running",
                    replacement.short(),
                    target.name
                ));
                for warning in
                    discard_replacement(&*self.runtime, &replacement, self.config.stop_timeout)
                        .await
                {
                    job.warn(warning);
                }
            }
            return Err(e);
        }

        self.disable_old_restart(job, target).await;
        job.log.line(format!("Stopping old container {}", target.name));
        let stopped = cancellable(cancel, UpgradeError::Cancelled, async {
            let result = match self
                .runtime
                .stop_container(&target.id, self.config.stop_timeout)
                .await
            {
                Ok(()) | Err(ContainerError::NotRunning(_)) => Ok(()),
                Err(e) => Err(e),
            };
            result.stopping(&target.name)
        })
        .await;
        match stopped {
            Ok(()) => {}
            Err(UpgradeError::Cancelled) => return Err(UpgradeError::Cancelled),
            Err(e) => job.warn(Warning::stop_superseded(e.to_string())),
        }

        job.advance(UpgradeState::OldRetired {
            container: replacement,
        });
        Ok(())
    }

    async fn pull(
        &self,
        job: &mut Job<'_>,
        image: &ImageRef,
        cancel: &CancellationToken,
    ) -> Result<(), UpgradeError> {
        if self.config.disable_pull {
            job.log
                .line(format!("Image pull disabled; using local {}", image));
        } else {
            job.log.line(format!("Pulling image {}", image));
            cancellable(cancel, UpgradeError::Cancelled, async {
                self.runtime.pull_image(image).await.pulling(image)
            })
            .await?;
        }
        job.advance(UpgradeState::ImagePulled);
        Ok(())
    }

    async fn stop_old(
        &self,
        job: &Job<'_>,
        target: &ContainerInfo,
        cancel: &CancellationToken,
    ) -> Result<(), UpgradeError> {
        let log = job.log;
        log.line(format!("Stopping container {}", target.name));
        cancellable(cancel, UpgradeError::Cancelled, async {
            let result = match self
                .runtime
                .stop_container(&target.id, self.config.stop_timeout)
                .await
            {
                Err(ContainerError::NotRunning(_)) => {
                    log.line(format!("Container {} was already stopped", target.name));
                    Ok(())
                }
                other => other,
            };
            result.stopping(&target.name)
        })
        .await
    }

    async fn backup(
        &self,
        job: &mut Job<'_>,
        target: &ContainerInfo,
        cancel: &CancellationToken,
    ) -> Result<(), UpgradeError> {
        let options = BackupOptions {
            provenance: (*self.provenance).clone(),
            backup_image: self.config.backup_image.clone(),
            pull_image: !self.config.disable_pull,
        };
        let records = backup_volumes(&*self.runtime, target, &options, job.log, cancel).await?;
        job.log
            .line(format!("Backed up {} volume(s)", records.len()));
        job.advance(UpgradeState::VolumesBackedUp);
        Ok(())
    }

    async fn start_replacement(
        &self,
        job: &mut Job<'_>,
        target: &ContainerInfo,
        image: &ImageRef,
        name: String,
    ) -> Result<ContainerId, UpgradeError> {
        job.log
            .line(format!("Starting container {} from {}", name, image));
        let spec = replacement_spec(target, image, name);
        let replacement = self.runtime.run_container(&spec).await.starting(image)?;
        job.advance(UpgradeState::ReplacementStarted {
            container: replacement.clone(),
        });
        Ok(replacement)
    }

    async fn await_healthy(
        &self,
        job: &mut Job<'_>,
        replacement: &ContainerId,
        cancel: &CancellationToken,
    ) -> Result<(), UpgradeError> {
        job.log.line(format!(
            "Waiting for container {} to become healthy",
            replacement.short()
        ));
        wait_for_healthy(&*self.runtime, replacement, self.config.health_wait(), cancel)
            .await
            .map_err(|e| UpgradeError::from_health(replacement.short(), e))?;
        job.log
            .line(format!("Container {} is healthy", replacement.short()));
        job.advance(UpgradeState::ReplacementHealthy {
            container: replacement.clone(),
        });
        Ok(())
    }

    async fn disable_old_restart(&self, job: &mut Job<'_>, target: &ContainerInfo) {
        job.log.line(format!(
            "Disabling restart policy of old container {}",
            target.name
        ));
        if let Err(e) = self
            .runtime
            .update_restart_policy(&target.id, &RestartPolicyConfig::No)
            .await
        {
            job.warn(Warning::restart_policy_disable(format!(
                "failed to disable restart policy of {}: {}",
                target.name, e
            )));
            job.log.line(format!(
                "Please remove the old container manually: docker rm {}",
                target.name
            ));
        }
    }
}
