// ABOUTME: Settings for job logs and status polling.
// ABOUTME: Log directory, response cap, poll timing and log retention.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on the bytes returned by one status poll.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatusConfig {
    /// Directory holding job log files. Defaults to the system temp dir.
    pub log_dir: Option<PathBuf>,

    pub max_response_bytes: u64,

    /// How long one poll waits for new lines.
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Pause before the final read of a finished job, so its last lines land.
    #[serde(with = "humantime_serde")]
    pub flush_grace: Duration,

    /// How long a finished job's log is kept.
    #[serde(with = "humantime_serde")]
    pub retention: Duration,
}

impl StatusConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            log_dir: None,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            poll_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            flush_grace: Duration::from_secs(1),
            retention: Duration::from_secs(5 * 60),
        }
    }
}
