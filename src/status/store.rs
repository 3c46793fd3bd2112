// ABOUTME: Tracks upgrade jobs by log token and answers incremental status polls.
// ABOUTME: Owns the in-progress set, terminal statuses and log file retention.

use super::log_reader::read_log_lines;
use super::{JobStatus, StatusError, StatusResponse};
use crate::config::StatusConfig;
use crate::types::{ContainerId, LOG_FILE_SUFFIX, LogToken};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const STATUS_FILE_SUFFIX: &str = ".status";

/// A job still marked running after this long belongs to a dead process.
const STALE_JOB_AGE: Duration = Duration::from_secs(60 * 60);

/// Shared registry of upgrade jobs.
#[derive(Debug)]
pub struct UpgradeStatusStore {
    config: StatusConfig,
    /// Jobs whose task is still running, with their target.
    running: Mutex<HashMap<LogToken, ContainerId>>,
    /// Terminal status of finished jobs whose log is still retained.
    finished: Mutex<HashMap<LogToken, JobStatus>>,
}

impl UpgradeStatusStore {
    pub fn new(config: StatusConfig) -> Self {
        Self {
            config,
            running: Mutex::new(HashMap::new()),
            finished: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config.log_dir()
    }

    /// Add a job to the in-progress set.
    ///
    /// Returns false, leaving the set unchanged, if the token is already
    /// present or the target already has a job.
    pub fn register(&self, token: LogToken, target: ContainerId) -> bool {
        let mut running = self.running.lock();
        if running.contains_key(&token) || running.values().any(|t| *t == target) {
            return false;
        }
        self.write_status_file(&token, JobStatus::Running);
        running.insert(token, target);
        true
    }

    fn write_status_file(&self, token: &LogToken, status: JobStatus) {
        if let Err(e) = std::fs::write(self.status_path(token), status.as_str()) {
            tracing::warn!(token = %token, error = %e, "failed to write job status file");
        }
    }

    pub fn is_target_upgrading(&self, target: &ContainerId) -> bool {
        self.running.lock().values().any(|t| t == target)
    }

    pub fn is_any_upgrade_running(&self) -> bool {
        !self.running.lock().is_empty()
    }

    fn is_running(&self, token: &LogToken) -> bool {
        self.running.lock().contains_key(token)
    }

    fn status_path(&self, token: &LogToken) -> PathBuf {
        let stem = token
            .as_str()
            .strip_suffix(LOG_FILE_SUFFIX)
            .unwrap_or(token.as_str());
        self.log_dir().join(format!("{}{}", stem, STATUS_FILE_SUFFIX))
    }

    /// Status of a job, or `None` if nothing is known about it.
    ///
    /// Jobs run by another process are known through the status file their
    /// process keeps next to the log. A log with no live job behind it, or
    /// one still marked running long after it started, is reported as failed.
    pub fn job_status(&self, token: &LogToken) -> Option<JobStatus> {
        if self.is_running(token) {
            return Some(JobStatus::Running);
        }
        if let Some(status) = self.finished.lock().get(token).copied() {
            return Some(status);
        }
        let status_path = self.status_path(token);
        match std::fs::read_to_string(&status_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
        {
            Some(JobStatus::Running) if is_older_than(&status_path, STALE_JOB_AGE) => {
                Some(JobStatus::Failed)
            }
            Some(status) => Some(status),
            None if self.log_dir().join(token.as_str()).exists() => Some(JobStatus::Failed),
            None => None,
        }
    }

    /// Record that a job's task ended, and schedule its log for deletion
    /// after the retention period.
    pub fn finish(self: &Arc<Self>, token: &LogToken, status: JobStatus) {
        self.running.lock().remove(token);
        self.finished.lock().insert(token.clone(), status);
        self.write_status_file(token, status);
        tracing::info!(token = %token, ?status, "upgrade job finished");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(token = %token, "no runtime to schedule log deletion");
            return;
        };
        let store = Arc::clone(self);
        let token = token.clone();
        handle.spawn(async move {
            tokio::time::sleep(store.config.retention).await;
            store.forget(&token);
        });
    }

    /// Delete the files of jobs that ended more than the retention period
    /// ago, including jobs abandoned by a process that exited early.
    ///
    /// Returns the number of jobs removed.
    pub fn sweep_expired(&self) -> usize {
        let dir = self.log_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %dir.display(), error = %e, "job log dir not readable");
                return 0;
            }
        };

        let tokens: HashSet<LogToken> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let stem = name
                    .strip_suffix(LOG_FILE_SUFFIX)
                    .or_else(|| name.strip_suffix(STATUS_FILE_SUFFIX))?;
                LogToken::parse(&format!("{}{}", stem, LOG_FILE_SUFFIX)).ok()
            })
            .collect();

        let mut removed = 0;
        for token in tokens {
            if self.is_running(&token) || !self.is_expired(&token) {
                continue;
            }
            tracing::info!(token = %token, "removing expired upgrade job files");
            self.forget(&token);
            removed += 1;
        }
        removed
    }

    fn is_expired(&self, token: &LogToken) -> bool {
        let status_path = self.status_path(token);
        let status = std::fs::read_to_string(&status_path)
            .ok()
            .and_then(|s| s.trim().parse::<JobStatus>().ok());
        match status {
            Some(JobStatus::Running) => is_older_than(&status_path, STALE_JOB_AGE),
            Some(_) => is_older_than(&status_path, self.config.retention),
            None => is_older_than(&self.log_dir().join(token.as_str()), self.config.retention),
        }
    }

    fn forget(&self, token: &LogToken) {
        self.finished.lock().remove(token);
        for path in [self.log_dir().join(token.as_str()), self.status_path(token)] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "job file deleted"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to delete job file")
                }
            }
        }
    }

    /// Lines written to the job log since `offset`.
    ///
    /// Waits up to the poll timeout for new lines while the job runs. A
    /// timed-out or cancelled poll returns no lines at the same offset.
    pub async fn upgrade_status(
        &self,
        token: &str,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<StatusResponse, StatusError> {
        let token = LogToken::parse(token).map_err(|_| StatusError::InvalidToken(token.to_string()))?;
        let path = self.log_dir().join(token.as_str());

        let poll = async {
            let mut grace_taken = false;
            loop {
                let status = self.job_status(&token);
                let finished = matches!(status, Some(JobStatus::Succeeded | JobStatus::Failed));
                if finished && !grace_taken {
                    tokio::time::sleep(self.config.flush_grace).await;
                    grace_taken = true;
                }

                let chunk = read_log_lines(&path, offset, self.config.max_response_bytes)
                    .map_err(|e| match e.kind() {
                        io::ErrorKind::NotFound => StatusError::JobNotFound(token.clone()),
                        _ => StatusError::Io(e),
                    })?;

                let done = finished && chunk.at_end;
                if !chunk.lines.is_empty() || done {
                    return Ok(StatusResponse {
                        lines: chunk.lines,
                        offset: chunk.offset,
                        done,
                        status: status.unwrap_or(JobStatus::Running),
                    });
                }

                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        let idle = || StatusResponse {
            lines: Vec::new(),
            offset,
            done: false,
            status: JobStatus::Running,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(idle()),
            result = tokio::time::timeout(self.config.poll_timeout, poll) => {
                result.unwrap_or_else(|_| Ok(idle()))
            }
        }
    }
}

/// Whether the file at `path` was last modified more than `age` ago.
fn is_older_than(path: &Path, age: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|elapsed| elapsed > age)
}
