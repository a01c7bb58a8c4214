//! Incremental tailing of append-only session logs
//!
//! The tailer remembers a byte offset per file and returns only complete
//! lines appended since the last read.
//!
//! - **Truncation**: when the remembered offset exceeds the file size, the
//!   file is read again from the beginning.
//! - **Partial writes**: a trailing line without its newline is left in
//!   place and returned once it is complete.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Glob, relative to a projects directory, matching session logs
pub const SESSION_LOG_PATTERN: &str = "**/*.jsonl";

/// Byte-offset bookkeeping for a set of tailed files
#[derive(Debug, Default)]
pub struct LogTailer {
    offsets: HashMap<PathBuf, u64>,
}

impl LogTailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read complete lines appended to `path` since the previous call.
    pub fn read_new_lines(&mut self, path: &Path) -> Result<Vec<String>> {
        let mut file = File::open(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open {}: {}", path.display(), e),
            ))
        })?;
        let file_size = file.metadata()?.len();

        let mut start = self.offsets.get(path).copied().unwrap_or(0);
        if start > file_size {
            tracing::warn!(
                path = %path.display(),
                offset = start,
                file_size,
                "File truncated, reading from the beginning"
            );
            start = 0;
        }
        if start == file_size {
            self.offsets.insert(path.to_path_buf(), start);
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(start))?;
        let mut buf = Vec::with_capacity((file_size - start) as usize);
        file.read_to_end(&mut buf)?;

        // Only consume through the last newline
        let consumed = match buf.iter().rposition(|b| *b == b'\n') {
            Some(pos) => pos + 1,
            None => {
                self.offsets.insert(path.to_path_buf(), start);
                return Ok(Vec::new());
            }
        };

        let lines = String::from_utf8_lossy(&buf[..consumed])
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();

        self.offsets
            .insert(path.to_path_buf(), start + consumed as u64);
        Ok(lines)
    }

    /// Start tailing `path` from its current end, skipping existing content.
    pub fn skip_to_end(&mut self, path: &Path) -> Result<()> {
        let size = std::fs::metadata(path)?.len();
        self.offsets.insert(path.to_path_buf(), size);
        Ok(())
    }

    /// Stop tracking `path`
    pub fn forget(&mut self, path: &Path) {
        self.offsets.remove(path);
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.offsets.contains_key(path)
    }

    pub fn offset(&self, path: &Path) -> Option<u64> {
        self.offsets.get(path).copied()
    }
}

/// Session id for a log file: its file stem
pub fn session_id_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
}

/// Whether `path` looks like a session log
pub fn is_session_log(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

/// Find every session log under `root`
pub fn discover_logs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let pattern = root.join(SESSION_LOG_PATTERN);
    let entries = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| Error::Config(format!("Invalid glob pattern: {}", e)))?;

    let mut files: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
    files.sort();
    Ok(files)
}
