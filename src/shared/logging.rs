//! tracing subscriber setup.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use super::config::LogConfig;
use super::env_var::EnvVars;

const DEFAULT_DIRECTIVE: &str = "warn";

/// Build the filter from COMMITFLOW_LOG, falling back to warnings only.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(EnvVars::log_name())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber.
///
/// Logs go to stderr, as JSON lines when `json` is set. When the config names
/// a log file, a second layer appends plain-text records to it. The returned
/// guard flushes that file on drop and must be held for the process lifetime.
pub fn init(config: &LogConfig, json: bool) -> Option<WorkerGuard> {
    let json = json || config.json;

    let stderr_layer = if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter())
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(env_filter())
            .boxed()
    };

    let (file_layer, guard) = match config.file.as_deref().and_then(file_appender) {
        Some((writer, guard)) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(env_filter()),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    // A subscriber may already be installed when running under tests.
    let _ = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    guard
}

fn file_appender(
    path: &Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty())?;
    let file_name = path.file_name()?;
    let appender = tracing_appender::rolling::never(directory, file_name);
    Some(tracing_appender::non_blocking(appender))
}
