// ABOUTME: Application-wide error types for upshift.
// ABOUTME: Uses thiserror for ergonomic error handling.

use crate::runtime::{ContainerError, RuntimeError};
use crate::self_update::SelfUpdateError;
use crate::status::StatusError;
use crate::upgrade::UpgradeError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no running container labelled {0}")]
    NoManagedContainer(String),

    #[error("upgrade job {0} failed; see its log for details")]
    JobFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    SelfUpdate(#[from] SelfUpdateError),
}

pub type Result<T> = std::result::Result<T, Error>;
