// ABOUTME: Per-job progress log written line by line for status pollers.
// ABOUTME: Each line is timestamped, flushed on newline and mirrored to tracing.

use crate::types::{LOG_FILE_PREFIX, LOG_FILE_SUFFIX, LogToken};
use parking_lot::Mutex;
use std::fmt::Display;
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only log of one upgrade job.
///
/// The file name is the job's [`LogToken`]. Only complete lines ever reach
/// the file, so readers can stop at the last newline.
#[derive(Debug)]
pub struct JobLog {
    token: LogToken,
    path: PathBuf,
    file: Mutex<LineWriter<File>>,
}

impl JobLog {
    /// Create a new log file with a random token in `dir` (mode 0600).
    pub fn create(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (file, path) = tempfile::Builder::new()
            .prefix(LOG_FILE_PREFIX)
            .suffix(LOG_FILE_SUFFIX)
            .rand_bytes(16)
            .tempfile_in(dir)?
            .keep()
            .map_err(|e| e.error)?;

        let token = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| io::Error::other("log file name is not valid UTF-8"))
            .and_then(|name| LogToken::parse(name).map_err(io::Error::other))?;

        Ok(Self {
            token,
            path,
            file: Mutex::new(LineWriter::new(file)),
        })
    }

    pub fn token(&self) -> &LogToken {
        &self.token
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line.
    ///
    /// Write failures are reported through tracing only; a broken log must
    /// not abort the upgrade it describes.
    pub fn line(&self, message: impl Display) {
        let message = message.to_string();
        tracing::info!(token = %self.token, "{}", message);

        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let mut file = self.file.lock();
        for part in message.lines() {
            if let Err(e) = writeln!(file, "{} {}", timestamp, part) {
                tracing::warn!(token = %self.token, error = %e, "failed to write job log");
                return;
            }
        }
    }
}
