// ABOUTME: Asynchronous upgrade job tracking and incremental log streaming.
// ABOUTME: Exports the status store, log reader, poll response and errors.

mod log_reader;
mod store;

pub use log_reader::{LogChunk, read_log_lines};
pub use store::UpgradeStatusStore;

use crate::types::LogToken;
use serde::Serialize;

/// Lifecycle of an upgrade job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Answer to one status poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    /// New lines since the requested offset.
    pub lines: Vec<String>,
    /// Offset to pass to the next poll.
    pub offset: u64,
    /// The job has ended and every line has been returned.
    pub done: bool,
    pub status: JobStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("invalid log token: {0:?}")]
    InvalidToken(String),

    #[error("no upgrade job with log {0}")]
    JobNotFound(LogToken),

    #[error("failed to read job log: {0}")]
    Io(#[from] std::io::Error),
}
