// ABOUTME: Composable capability traits for container runtimes.
// ABOUTME: Defines ContainerOps, ImageOps, VolumeOps and the FullRuntime bundle.

mod container;
mod image;
mod shared_types;
mod volume;

pub use container::{ContainerError, ContainerFilters, ContainerOps, ContainerSummary};
pub use image::{ImageError, ImageOps};
pub use shared_types::*;
pub use volume::{VolumeError, VolumeOps};

/// Everything an upgrade needs from a runtime.
///
/// Implemented automatically for any type providing all capabilities.
pub trait FullRuntime: ContainerOps + ImageOps + VolumeOps {}

impl<T: ContainerOps + ImageOps + VolumeOps> FullRuntime for T {}
