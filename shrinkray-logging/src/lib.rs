//! Process-wide logging setup for the orchestration engine and its CLI front end.
//!
//! Console output is terse and human-facing; file output is verbose and meant
//! for postmortems of a worker that died mid-encode.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

static WORKER_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

pub const DEFAULT_CONSOLE_LEVEL: LevelFilter = LevelFilter::INFO;
pub const DEFAULT_FILE_LEVEL: LevelFilter = LevelFilter::DEBUG;

/// Initializes the global `tracing` subscriber once per process.
///
/// `log_path` is a file name (optionally with a parent directory) rotated daily
/// under `logs/`. Calling this a second time is a no-op save for a debug log line;
/// the underlying `tracing` global default can only be set once.
pub fn init_logging(console_level: LevelFilter, log_path: &Path, file_level: LevelFilter) {
    if WORKER_GUARD.get().is_some() {
        tracing::debug!("logging already initialized, skipping");
        return;
    }

    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        Path::new("logs").join(log_path.parent().unwrap_or_else(|| Path::new(""))),
        log_path.file_name().unwrap_or_else(|| "shrinkray.log".as_ref()),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Only the first caller in a process actually installs the subscriber; losing
    // this race just means we keep logging through whatever got there first.
    let _ = WORKER_GUARD.set(guard);

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(file_level.to_string())),
        )
        .with(
            fmt::layer()
                .compact()
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false)
                .with_file(false)
                .without_time()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::new(console_level.to_string())),
        );

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::debug!("logging system initialized");
    }
}

/// Convenience entry point for binaries that only want the documented defaults.
pub fn init_default(log_path: impl Into<PathBuf>) {
    init_logging(DEFAULT_CONSOLE_LEVEL, &log_path.into(), DEFAULT_FILE_LEVEL);
}
