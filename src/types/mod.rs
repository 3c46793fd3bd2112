// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Container/image/volume ids, image references, job log tokens, provenance.

mod id;
mod image_ref;
mod log_token;
mod provenance;

pub use id::{ContainerId, ImageId, VolumeName};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use log_token::{InvalidLogToken, LOG_FILE_PREFIX, LOG_FILE_SUFFIX, LogToken};
pub use provenance::Provenance;
