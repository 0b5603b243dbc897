//! Logging initialization.
//!
//! Stdout gets a human-readable layer filtered by `RUST_LOG`; a JSON
//! file layer under the data directory keeps a durable trail for
//! post-mortem inspection of long-running jobs.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize the global tracing subscriber.
///
/// Returns the appender guard; dropping it flushes buffered log lines,
/// so the caller must hold it for the lifetime of the process.
pub fn init(data_dir: &Path) -> Option<WorkerGuard> {
    let log_dir = data_dir.join("logs");
    if !log_dir.exists() {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create logs directory: {}", e);
        }
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fieldlog=info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(env_filter);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "fieldlog.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fieldlog=debug"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Some(guard)
}
