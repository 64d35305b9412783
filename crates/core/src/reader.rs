// crates/core/src/reader.rs
//! Incremental line reader for growing job output files.
//!
//! Tracks the byte offset into a file so that successive calls to `poll`
//! return only the lines appended since the last call. Tolerates files
//! that do not exist yet (jobs create their progress file lazily) and
//! self-heals on truncation/rotation by resetting the offset to 0.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::ReadError;

/// One line surfaced by [`LineReader::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailedLine {
    pub text: String,
    /// True when the source line exceeded the per-line byte budget and this
    /// is one of the budget-sized chunks it was split into.
    pub truncated: bool,
}

impl TailedLine {
    fn complete(bytes: &[u8]) -> Self {
        Self {
            text: String::from_utf8_lossy(bytes).into_owned(),
            truncated: false,
        }
    }

    fn partial(bytes: &[u8]) -> Self {
        Self {
            text: String::from_utf8_lossy(bytes).into_owned(),
            truncated: true,
        }
    }
}

/// Tracks a byte offset into a file for incremental line-by-line reading.
pub struct LineReader {
    path: PathBuf,
    /// Current read position (byte offset from start of file).
    position: u64,
    /// Maximum bytes a single returned line may carry. Longer lines are
    /// split into budget-sized chunks flagged as truncated so one
    /// pathological writer cannot grow unbounded buffers here.
    max_line_bytes: usize,
}

impl LineReader {
    pub fn new(path: PathBuf, max_line_bytes: usize) -> Self {
        Self {
            path,
            position: 0,
            max_line_bytes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read all complete lines appended since the last poll.
    ///
    /// - A missing file is not an error: returns no lines, and existence is
    ///   rechecked on the next call.
    /// - If the file shrank (rotation/truncation), the offset resets to 0
    ///   and reading resumes from the start.
    /// - An incomplete trailing line shorter than the budget is NOT
    ///   returned; it is picked up once its newline arrives. Trailing data
    ///   at or past the budget is drained as truncated chunks immediately.
    /// - Never blocks waiting for new data.
    pub async fn poll(&mut self) -> Result<Vec<TailedLine>, ReadError> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ReadError::io(&self.path, e)),
        };

        let metadata = file
            .metadata()
            .await
            .map_err(|e| ReadError::io(&self.path, e))?;
        let file_len = metadata.len();

        if file_len < self.position {
            tracing::debug!(
                path = %self.path.display(),
                old_position = self.position,
                new_len = file_len,
                "watched file shrank; resetting offset to 0"
            );
            self.position = 0;
        }

        if file_len == self.position {
            return Ok(Vec::new());
        }

        file.seek(std::io::SeekFrom::Start(self.position))
            .await
            .map_err(|e| ReadError::io(&self.path, e))?;
        let mut buf = Vec::with_capacity((file_len - self.position) as usize);
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| ReadError::io(&self.path, e))?;

        Ok(self.split_lines(&buf))
    }

    /// Split newly read bytes into lines, advancing the offset past every
    /// byte that was consumed into a returned line.
    fn split_lines(&mut self, bytes: &[u8]) -> Vec<TailedLine> {
        let mut lines = Vec::new();
        let mut start = 0usize;

        while let Some(rel) = memchr::memchr(b'\n', &bytes[start..]) {
            let line = &bytes[start..start + rel];
            if line.len() <= self.max_line_bytes {
                lines.push(TailedLine::complete(line));
            } else {
                for chunk in line.chunks(self.max_line_bytes) {
                    lines.push(TailedLine::partial(chunk));
                }
            }
            start += rel + 1;
        }

        // Unterminated tail: keep anything under the budget for the next
        // poll, but drain budget-sized chunks so the buffer stays bounded.
        let mut tail = &bytes[start..];
        while tail.len() >= self.max_line_bytes {
            lines.push(TailedLine::partial(&tail[..self.max_line_bytes]));
            start += self.max_line_bytes;
            tail = &bytes[start..];
        }

        self.position += start as u64;
        lines
    }
}
