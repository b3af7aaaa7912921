//! Tracing setup for the command-line binary.
//!
//! Console output goes to stderr and stays quiet (warnings and errors) unless
//! `verbose` is set, since the CLI prints its own progress. When a log
//! directory is given, a daily-rotating `file_sorter.log` receives every
//! info-level event as well.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of the rotating log files.
pub const LOG_FILE_PREFIX: &str = "file_sorter.log";

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides the console level. The returned guard must be held
/// for the life of the program to keep the file writer flushing.
pub fn setup_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let mut guard = None;
    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let (non_blocking, worker_guard) =
                tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX));
            guard = Some(worker_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_filter(EnvFilter::new(if verbose { "debug" } else { "info" })),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(verbose, log_dir = ?log_dir, "Logging initialized");
    Ok(guard)
}

/// Newest log file in `dir` whose name starts with [`LOG_FILE_PREFIX`].
///
/// Rotated files carry a date suffix, so name order is age order.
pub fn latest_log_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with(LOG_FILE_PREFIX))
        })
        .collect();
    logs.sort();
    Ok(logs.pop())
}

/// Last `count` lines of the file at `path`.
pub fn tail_lines(path: &Path, count: usize) -> io::Result<Vec<String>> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].iter().map(|line| line.to_string()).collect())
}
