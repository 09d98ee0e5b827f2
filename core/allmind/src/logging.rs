//! Subscriber setup for the CLI.
//!
//! `ALLMIND_DEBUG_LOG=1` forces `debug`; otherwise `RUST_LOG` applies with an
//! `info` default. Output goes to stderr, or to a daily-rolling file under
//! `ALLMIND_LOG_DIR` when that is set. stdout is reserved for JSON.

use std::env;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "allmind.log";

/// Installs the global subscriber. Hold the returned guard until exit so
/// buffered file output is flushed.
pub fn init() -> Option<WorkerGuard> {
    let filter = if debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match env::var_os("ALLMIND_LOG_DIR").map(PathBuf::from) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

fn debug_enabled() -> bool {
    env::var("ALLMIND_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}
