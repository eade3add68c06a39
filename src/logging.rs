//! Tracing configuration and log routing.
//!
//! Logs go to stdout through a compact formatter and, unless disabled, to a file as well.
//! `DOCQUEST_LOG_FILE` selects the file path; the value `off` turns file logging off. Without
//! it logs are appended to `logs/docquest.log`. The file layer uses a non-blocking writer.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_ENV: &str = "DOCQUEST_LOG_FILE";

/// Where the optional file layer writes.
#[derive(Debug, PartialEq, Eq)]
enum FileTarget {
    Disabled,
    Explicit(String),
    Default,
}

/// Configure tracing subscribers for stdout and optional file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact stdout layer and, when available, a file layer.
/// - Keeps the non-blocking writer guard alive for the process lifetime.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = file_target(std::env::var(LOG_FILE_ENV).ok());
    if let Some(writer) = configure_file_writer(target) {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

fn file_target(value: Option<String>) -> FileTarget {
    match value.as_deref().map(str::trim) {
        Some(path) if path.eq_ignore_ascii_case("off") => FileTarget::Disabled,
        Some(path) if !path.is_empty() => FileTarget::Explicit(path.to_string()),
        _ => FileTarget::Default,
    }
}

/// Build a non-blocking writer for file logging.
///
/// Returns `None` when file logging is disabled or the target cannot be opened.
fn configure_file_writer(target: FileTarget) -> Option<NonBlocking> {
    match target {
        FileTarget::Disabled => None,
        FileTarget::Explicit(path) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let _ = LOG_GUARD.set(guard);
                Some(non_blocking)
            }
            Err(err) => {
                eprintln!("Failed to open log file {path}: {err}");
                None
            }
        },
        FileTarget::Default => {
            if let Err(err) = std::fs::create_dir_all("logs") {
                eprintln!("Failed to create logs directory: {err}");
                return None;
            }
            let file_appender = tracing_appender::rolling::never("logs", "docquest.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
    }
}
