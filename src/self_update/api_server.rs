// ABOUTME: Lifecycle hooks of the local API server paused during self-update.
// ABOUTME: Includes a no-op implementation for processes without a server.

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ApiServerError(pub String);

/// The API server sharing this process, stopped while the replacement
/// container starts so the two never serve at once.
#[async_trait]
pub trait ApiServer: Send + Sync {
    async fn stop(&self) -> Result<(), ApiServerError>;
    async fn start(&self) -> Result<(), ApiServerError>;
}

/// For processes that serve no API, such as the CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopApiServer;

#[async_trait]
impl ApiServer for NoopApiServer {
    async fn stop(&self) -> Result<(), ApiServerError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), ApiServerError> {
        Ok(())
    }
}
