//! Session-log directory watcher
//!
//! Watches a projects directory recursively for `*.jsonl` changes, debounced,
//! and hands complete new lines to a callback. Runs on the calling thread
//! until `running` is cleared.

use anyhow::{Context, Result};
use neuralviz_core::ingest::tail::{discover_logs, is_session_log, session_id_from_path};
use neuralviz_core::ingest::LogTailer;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

/// How often the loop wakes to check `running`
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Where reading starts in a file seen for the first time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAt {
    Beginning,
    End,
}

#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Files present when watching starts
    pub existing: StartAt,
    /// Files that appear later
    pub new_files: StartAt,
    pub debounce: Duration,
}

/// Watch `root` and call `on_lines(session_id, lines)` for every batch of new lines.
pub fn run<F>(root: &Path, options: &TailOptions, running: &AtomicBool, mut on_lines: F) -> Result<()>
where
    F: FnMut(&str, Vec<String>),
{
    let mut tailer = LogTailer::new();

    let existing = discover_logs(root).context("failed to list session logs")?;
    for path in &existing {
        begin(&mut tailer, path, options.existing, &mut on_lines);
    }

    let (tx, rx) = mpsc::channel::<DebounceEventResult>();
    let mut debouncer =
        new_debouncer(options.debounce, tx).context("failed to create file watcher")?;
    debouncer
        .watcher()
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", root.display()))?;

    tracing::info!(root = %root.display(), files = existing.len(), "Watching session logs");

    while running.load(Ordering::SeqCst) {
        let events = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "File watcher error");
                continue;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for event in events {
            if event.path.is_dir() {
                // A new project directory may already contain logs
                paths.extend(discover_logs(&event.path).unwrap_or_default());
            } else if is_session_log(&event.path) {
                paths.push(event.path);
            }
        }
        paths.sort();
        paths.dedup();

        for path in paths {
            if !path.exists() {
                tailer.forget(&path);
                continue;
            }
            if tailer.is_tracked(&path) {
                read(&mut tailer, &path, &mut on_lines);
            } else {
                begin(&mut tailer, &path, options.new_files, &mut on_lines);
            }
        }
    }

    tracing::info!("Session log watcher stopped");
    Ok(())
}

fn begin<F>(tailer: &mut LogTailer, path: &Path, start: StartAt, on_lines: &mut F)
where
    F: FnMut(&str, Vec<String>),
{
    match start {
        StartAt::Beginning => read(tailer, path, on_lines),
        StartAt::End => {
            if let Err(e) = tailer.skip_to_end(path) {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat session log");
            } else {
                tracing::debug!(path = %path.display(), "Tracking new session log from its end");
            }
        }
    }
}

fn read<F>(tailer: &mut LogTailer, path: &Path, on_lines: &mut F)
where
    F: FnMut(&str, Vec<String>),
{
    let Some(session_id) = session_id_from_path(path) else {
        return;
    };
    match tailer.read_new_lines(path) {
        Ok(lines) if lines.is_empty() => {}
        Ok(lines) => {
            tracing::debug!(session_id = %session_id, lines = lines.len(), "New session log lines");
            on_lines(&session_id, lines);
        }
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to read session log"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_existing_files_replayed_before_watch() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("proj");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("sess-1.jsonl"), "{\"role\":\"user\"}\n").unwrap();
        std::fs::write(project.join("sess-2.jsonl"), "{}\n").unwrap();

        // Cleared up front: the loop replays existing files then exits
        let running = Arc::new(AtomicBool::new(false));
        let mut seen = Vec::new();
        let options = TailOptions {
            existing: StartAt::Beginning,
            new_files: StartAt::Beginning,
            debounce: Duration::from_millis(50),
        };
        run(dir.path(), &options, &running, |session, lines| {
            seen.push((session.to_string(), lines.len()));
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![("sess-1".to_string(), 1), ("sess-2".to_string(), 1)]
        );
    }

    #[test]
    fn test_existing_files_skipped_from_end() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("s.jsonl"), "{}\n").unwrap();

        let running = AtomicBool::new(false);
        let mut calls = 0;
        let options = TailOptions {
            existing: StartAt::End,
            new_files: StartAt::End,
            debounce: Duration::from_millis(50),
        };
        run(dir.path(), &options, &running, |_, _| calls += 1).unwrap();
        assert_eq!(calls, 0);
    }
}
