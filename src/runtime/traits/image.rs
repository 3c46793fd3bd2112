// ABOUTME: Image operations trait for container runtimes.
// ABOUTME: Pull images and resolve references to image ids.

use crate::types::{ImageId, ImageRef};
use async_trait::async_trait;

/// Image operations: pull and inspect.
#[async_trait]
pub trait ImageOps: Send + Sync {
    /// Pull an image, consuming the progress stream until it completes.
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError>;

    /// Resolve a local image reference to its id.
    async fn inspect_image(&self, reference: &ImageRef) -> Result<ImageId, ImageError>;
}

/// Errors from image operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
