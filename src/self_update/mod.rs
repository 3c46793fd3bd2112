// ABOUTME: Periodic self-update of the container this process runs in.
// ABOUTME: Guarded against overlap, coordinated with upgrades and the local API server.

mod api_server;

pub use api_server::{ApiServer, ApiServerError, NoopApiServer};

use crate::config::SelfUpdateConfig;
use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::{
    ContainerError, ContainerInfo, FullRuntime, HealthWaitError, ImageError,
    RestartPolicyConfig, wait_for_healthy,
};
use crate::status::UpgradeStatusStore;
use crate::types::{ContainerId, ImageRef};
use crate::upgrade::{cancellable, discard_replacement, name_timestamp, replacement_spec};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Why a check did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another check holds the guard.
    AlreadyRunning,
    /// An upgrade job is in flight.
    UpgradeInProgress,
}

/// Result of one self-update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateOutcome {
    Skipped(SkipReason),
    UpToDate,
    /// The replacement is healthy; this container is being retired.
    Updated {
        container: ContainerId,
        warnings: Vec<Warning>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SelfUpdateError {
    #[error("failed to locate own container {name}: {source}")]
    LocateSelf {
        name: String,
        #[source]
        source: ContainerError,
    },

    #[error("invalid target image '{image}': {reason}")]
    InvalidImage { image: String, reason: String },

    #[error("failed to pull image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: ImageError,
    },

    #[error("failed to inspect image {image}: {source}")]
    ImageInspect {
        image: String,
        #[source]
        source: ImageError,
    },

    #[error("failed to stop API server: {0}")]
    ApiServerStop(#[source] ApiServerError),

    #[error("failed to start container from {image}: {source}")]
    ContainerStart {
        image: String,
        #[source]
        source: ContainerError,
    },

    #[error("new container {container} failed its health check: {source}")]
    HealthCheck {
        container: String,
        #[source]
        source: HealthWaitError,
    },

    #[error("self-update cancelled")]
    Cancelled,
}

/// Timer-driven loop replacing this process's own container.
pub struct SelfUpdater<R> {
    runtime: Arc<R>,
    api_server: Arc<dyn ApiServer>,
    store: Arc<UpgradeStatusStore>,
    config: SelfUpdateConfig,
    hostname: String,
    guard: Mutex<()>,
}

impl<R: FullRuntime + 'static> SelfUpdater<R> {
    /// The container to replace is looked up by `config.hostname`, falling
    /// back to the machine hostname.
    pub fn new(
        runtime: Arc<R>,
        api_server: Arc<dyn ApiServer>,
        store: Arc<UpgradeStatusStore>,
        config: SelfUpdateConfig,
    ) -> Self {
        let hostname = config
            .hostname
            .clone()
            .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned());
        Self {
            runtime,
            api_server,
            store,
            config,
            hostname,
            guard: Mutex::new(()),
        }
    }

    /// Launch the loop; it runs until `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                interval = ?self.config.interval,
                check_on_start = self.config.check_on_start,
                "self-update scheduler started"
            );

            if self.config.check_on_start {
                self.tick(&cancel).await;
            }

            let period = self.config.interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.tick(&cancel).await,
                }
            }

            tracing::info!("self-update scheduler stopped");
        })
    }

    async fn tick(&self, cancel: &CancellationToken) {
        match self.run_once(cancel).await {
            Ok(SelfUpdateOutcome::Skipped(reason)) => {
                tracing::info!(?reason, "self-update check skipped");
            }
            Ok(SelfUpdateOutcome::UpToDate) => tracing::info!("already up to date"),
            Ok(SelfUpdateOutcome::Updated { container, warnings }) => {
                tracing::info!(container = %container, warnings = warnings.len(), "self-update complete");
            }
            Err(e) => tracing::error!(error = %e, "self-update failed"),
        }
    }

    /// Run one check, updating if a newer image is available.
    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SelfUpdateOutcome, SelfUpdateError> {
        let Ok(_guard) = self.guard.try_lock() else {
            tracing::info!("self-update already running");
            return Ok(SelfUpdateOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        let current = self
            .runtime
            .inspect_container(&ContainerId::new(self.hostname.as_str()))
            .await
            .map_err(|source| SelfUpdateError::LocateSelf {
                name: self.hostname.clone(),
                source,
            })?;
        let image = self.target_image(&current)?;

        if !self.config.disable_pull {
            tracing::info!(image = %image, "pulling image");
            cancellable(cancel, SelfUpdateError::Cancelled, async {
                self.runtime
                    .pull_image(&image)
                    .await
                    .map_err(|source| SelfUpdateError::ImagePull {
                        image: image.to_string(),
                        source,
                    })
            })
            .await?;
        }

        let target_id = self
            .runtime
            .inspect_image(&image)
            .await
            .map_err(|source| SelfUpdateError::ImageInspect {
                image: image.to_string(),
                source,
            })?;
        if target_id == current.image_id {
            return Ok(SelfUpdateOutcome::UpToDate);
        }
        tracing::info!(
            current = %current.image_id.short(),
            target = %target_id.short(),
            "update available"
        );

        if self.store.is_any_upgrade_running() {
            return Ok(SelfUpdateOutcome::Skipped(SkipReason::UpgradeInProgress));
        }

        self.api_server
            .stop()
            .await
            .map_err(SelfUpdateError::ApiServerStop)?;

        let mut diagnostics = Diagnostics::default();

        // An upgrade may have been requested while the server was stopping
        if self.store.is_any_upgrade_running() {
            self.restart_api_server(&mut diagnostics).await;
            return Ok(SelfUpdateOutcome::Skipped(SkipReason::UpgradeInProgress));
        }

        match self.replace(&current, &image, &mut diagnostics, cancel).await {
            Ok(container) => Ok(SelfUpdateOutcome::Updated {
                container,
                warnings: diagnostics.into_warnings(),
            }),
            Err(e) => {
                self.restart_api_server(&mut diagnostics).await;
                Err(e)
            }
        }
    }

    fn target_image(&self, current: &ContainerInfo) -> Result<ImageRef, SelfUpdateError> {
        if let Some(image) = &self.config.image {
            return Ok(image.clone());
        }
        ImageRef::parse(&current.image).map_err(|e| SelfUpdateError::InvalidImage {
            image: current.image.clone(),
            reason: e.to_string(),
        })
    }

    async fn replace(
        &self,
        current: &ContainerInfo,
        image: &ImageRef,
        diagnostics: &mut Diagnostics,
        cancel: &CancellationToken,
    ) -> Result<ContainerId, SelfUpdateError> {
        let name = format!(
            "{}-{}",
            self.config.container_name_prefix,
            name_timestamp(chrono::Utc::now())
        );
        tracing::info!(name = %name, image = %image, "starting new container");

        let spec = replacement_spec(current, image, name);
        let replacement = self.runtime.run_container(&spec).await.map_err(|source| {
            SelfUpdateError::ContainerStart {
                image: image.to_string(),
                source,
            }
        })?;

        if let Err(source) =
            wait_for_healthy(&*self.runtime, &replacement, self.config.health_wait(), cancel).await
        {
            if matches!(source, HealthWaitError::Cancelled) {
                return Err(SelfUpdateError::Cancelled);
            }
            for warning in discard_replacement(&*self.runtime, &replacement, None).await {
                diagnostics.warn(warning);
            }
            return Err(SelfUpdateError::HealthCheck {
                container: replacement.short().to_string(),
                source,
            });
        }

        tracing::info!(container = %replacement, "new container is healthy; retiring this one");

        if let Err(e) = self
            .runtime
            .update_restart_policy(&current.id, &RestartPolicyConfig::No)
            .await
        {
            diagnostics.warn(Warning::restart_policy_disable(format!(
                "failed to disable restart policy of {}: {}",
                current.name, e
            )));
        }

        match self.runtime.stop_container(&current.id, None).await {
            Ok(()) | Err(ContainerError::NotRunning(_)) => {}
            Err(e) => diagnostics.warn(Warning::stop_superseded(format!(
                "failed to stop {}: {}",
                current.name, e
            ))),
        }

        Ok(replacement)
    }

    async fn restart_api_server(&self, diagnostics: &mut Diagnostics) {
        if let Err(e) = self.api_server.start().await {
            diagnostics.warn(Warning::api_server_restart(format!(
                "failed to restart API server: {}",
                e
            )));
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
