//! Logging Infrastructure
//!
//! Structured logging setup for development (pretty) and production (json).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Default filter used when `RUST_LOG` is unset
fn default_filter(level: &str) -> String {
    format!("catalog_server={level},shared={level},tower_http={level},sqlx=warn")
}

/// Initialize the logger with optional file output
///
/// `RUST_LOG` takes precedence over `log_level`. When `log_dir` is given,
/// output goes to a daily rolling file instead of stdout; keep the returned
/// guard alive for the lifetime of the process so buffered lines are flushed.
pub fn init_logger_with_file(
    log_level: &str,
    format: LogFormat,
    log_dir: Option<&Path>,
) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true);

    let (writer, guard) = match log_dir {
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let file_appender = tracing_appender::rolling::daily(dir, "catalog-server");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            (Some(writer), Some(guard))
        }
        Some(dir) => {
            eprintln!("log directory {} is not usable, logging to stdout", dir.display());
            (None, None)
        }
        None => (None, None),
    };

    // try_init: a second initialization (tests) is not an error
    let result = match (format, writer) {
        (LogFormat::Json, Some(w)) => builder.json().with_ansi(false).with_writer(w).try_init(),
        (LogFormat::Json, None) => builder.json().try_init(),
        (LogFormat::Pretty, Some(w)) => builder.with_ansi(false).with_writer(w).try_init(),
        (LogFormat::Pretty, None) => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("logger already initialized: {e}");
    }

    guard
}
