// ABOUTME: Container runtime abstraction for Docker and Podman.
// ABOUTME: Capability traits, the bollard adapter, detection and health waiting.

mod bollard;
mod detection;
mod error;
mod health;
mod managed;
pub mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_runtime};
pub use error::RuntimeError;
pub use health::{HealthWait, HealthWaitError, wait_for_healthy};
pub use managed::find_managed_containers;
pub use traits::*;
pub use types::{ConnectionError, RuntimeConfig, RuntimeInfo, RuntimeType};
