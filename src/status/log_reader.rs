// ABOUTME: Incremental reader for job log files.
// ABOUTME: Returns complete lines from a byte offset, bounded by a byte cap.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// Lines read from one offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    /// Complete lines, without their trailing newline.
    pub lines: Vec<String>,
    /// Offset just past the last returned line.
    pub offset: u64,
    /// Reading stopped at the end of the complete lines, not at the cap.
    pub at_end: bool,
}

/// Read complete lines of `path` starting at `offset`.
///
/// Stops before the line that would push the total past `max_bytes`, except
/// that a single oversized first line is returned by itself. A trailing line
/// without its newline is left for the next read.
///
/// Lines are decoded lossily: bytes that are not valid UTF-8 come back as
/// U+FFFD, so only UTF-8 logs are reproduced exactly. Offsets always count
/// raw bytes.
pub fn read_log_lines(path: &Path, offset: u64, max_bytes: u64) -> io::Result<LogChunk> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut reader = BufReader::new(file);

    let mut lines = Vec::new();
    let mut consumed = 0u64;
    let mut buf = Vec::new();
    let at_end = loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)? as u64;
        if n == 0 || buf.last() != Some(&b'\n') {
            break true;
        }
        if consumed + n > max_bytes && !lines.is_empty() {
            break false;
        }

        buf.pop();
        lines.push(String::from_utf8_lossy(&buf).into_owned());
        consumed += n;

        if consumed >= max_bytes {
            break false;
        }
    };

    Ok(LogChunk {
        lines,
        offset: offset + consumed,
        at_end,
    })
}
