//! Tracing setup. Command-line runs log to stderr; the TUI owns the terminal,
//! so it logs to a file instead.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "specimport.log";

fn filter(verbose: u8) -> EnvFilter {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("specimport={level}")))
}

pub fn init_stderr(verbose: u8) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))
}

/// Log to `<dir>/specimport.log`. Keep the guard alive until exit or buffered
/// lines are lost.
pub fn init_file(dir: &Path, verbose: u8) -> Result<WorkerGuard> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create log dir {}", dir.display()))?;
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose.max(1)))
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))?;
    Ok(guard)
}
