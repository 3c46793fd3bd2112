// ABOUTME: Volume operations trait for container runtimes.
// ABOUTME: Creates named volumes, refusing to reuse an existing name.

use crate::types::VolumeName;
use async_trait::async_trait;
use std::collections::HashMap;

use super::shared_types::VolumeInfo;

#[async_trait]
pub trait VolumeOps: Send + Sync {
    /// Create a named volume. Fails with `AlreadyExists` rather than silently
    /// returning the existing volume.
    async fn create_volume(
        &self,
        name: &VolumeName,
        labels: &HashMap<String, String>,
    ) -> Result<VolumeInfo, VolumeError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum VolumeError {
    #[error("volume already exists: {0}")]
    AlreadyExists(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
