// ABOUTME: Configuration types and parsing for upshift.yml.
// ABOUTME: Handles YAML parsing, file discovery, environment overrides and validation.

mod init;
mod self_update;
mod status;
mod upgrade;

pub use init::init_config;
pub use self_update::SelfUpdateConfig;
pub use status::{DEFAULT_MAX_RESPONSE_BYTES, StatusConfig};
pub use upgrade::UpgradeConfig;

use crate::error::{Error, Result};
use crate::runtime::RuntimeConfig;
use crate::types::{ImageRef, Provenance};
use crate::upgrade::ReplacementOrder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "upshift.yml";
pub const CONFIG_FILENAME_ALT: &str = "upshift.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".upshift/config.yml";

pub const ENV_SELF_UPDATE_IMAGE: &str = "UPSHIFT_SELF_UPDATE_IMAGE";
pub const ENV_DISABLE_PULL: &str = "UPSHIFT_DISABLE_PULL";
pub const ENV_CHECK_ON_START: &str = "UPSHIFT_CHECK_ON_START";
pub const ENV_LOG_DIR: &str = "UPSHIFT_LOG_DIR";

/// Complete configuration. Every field has a default, so an empty file (or
/// no file at all) is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub provenance: Provenance,
    pub runtime: RuntimeConfig,
    pub upgrade: UpgradeConfig,
    pub status: StatusConfig,
    pub self_update: SelfUpdateConfig,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as null rather than an empty map
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Find a config file in `dir`, if there is one.
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        match Self::find(dir) {
            Some(path) => Self::load(&path).map(Some),
            None => Ok(None),
        }
    }

    fn find(dir: &Path) -> Option<PathBuf> {
        [CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Load the effective configuration: the explicit file if given, else a
    /// discovered one, else defaults; then environment overrides; then
    /// validation.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::discover(dir)?.unwrap_or_default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `UPSHIFT_*` environment variables on top of file values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(image) = env_var(ENV_SELF_UPDATE_IMAGE) {
            let image = ImageRef::parse(&image).map_err(|e| {
                Error::InvalidConfig(format!("{}: {}", ENV_SELF_UPDATE_IMAGE, e))
            })?;
            self.self_update.image = Some(image);
        }

        if let Some(value) = env_var(ENV_DISABLE_PULL) {
            let disable = parse_bool(ENV_DISABLE_PULL, &value)?;
            self.upgrade.disable_pull = disable;
            self.self_update.disable_pull = disable;
        }

        if let Some(value) = env_var(ENV_CHECK_ON_START) {
            self.self_update.check_on_start = parse_bool(ENV_CHECK_ON_START, &value)?;
        }

        if let Some(dir) = env_var(ENV_LOG_DIR) {
            self.status.log_dir = Some(PathBuf::from(dir));
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.provenance.key.is_empty() || self.provenance.value.is_empty() {
            return Err(Error::InvalidConfig(
                "provenance key and value must not be empty".to_string(),
            ));
        }

        if self.self_update.order == ReplacementOrder::StopThenStart {
            return Err(Error::InvalidConfig(
                "self_update.order must be start-then-stop: stopping this container first would stop the update"
                    .to_string(),
            ));
        }

        let durations = [
            ("upgrade.health_timeout", self.upgrade.health_timeout),
            ("upgrade.health_poll_interval", self.upgrade.health_poll_interval),
            ("status.poll_timeout", self.status.poll_timeout),
            ("status.poll_interval", self.status.poll_interval),
            ("self_update.interval", self.self_update.interval),
            ("self_update.health_timeout", self.self_update.health_timeout),
            (
                "self_update.health_poll_interval",
                self.self_update.health_poll_interval,
            ),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| *d == Duration::ZERO) {
            return Err(Error::InvalidConfig(format!("{} must be greater than zero", name)));
        }

        if self.status.max_response_bytes == 0 {
            return Err(Error::InvalidConfig(
                "status.max_response_bytes must be greater than zero".to_string(),
            ));
        }

        for (name, prefix) in [
            ("upgrade.container_name_prefix", &self.upgrade.container_name_prefix),
            (
                "self_update.container_name_prefix",
                &self.self_update.container_name_prefix,
            ),
        ] {
            if prefix.is_empty() {
                return Err(Error::InvalidConfig(format!("{} must not be empty", name)));
            }
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfig(format!(
            "{}: expected a boolean, got '{}'",
            name, other
        ))),
    }
}
