use std::fs;
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "dashboard-sync.log";
const DEFAULT_DIRECTIVE: &str = "dashboard_sync=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Console on stdout plus a daily rolling JSON file in `log_dir`
fn file_and_console_subscriber(
    log_dir: &Path,
    filter: EnvFilter,
) -> (impl Subscriber + Send + Sync + 'static, WorkerGuard) {
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().json().with_writer(non_blocking_writer));
    (subscriber, guard)
}

/// Initializes console logging plus a daily rolling JSON log under `logs/`.
///
/// The returned guard flushes the file writer on drop, so keep it alive for
/// the whole run.
pub fn init_logging() -> Option<WorkerGuard> {
    if let Err(e) = fs::create_dir_all(LOG_DIR) {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_writer(std::io::stdout))
            .init();
        tracing::warn!("File logging disabled, cannot create {}: {}", LOG_DIR, e);
        return None;
    }

    let (subscriber, guard) = file_and_console_subscriber(Path::new(LOG_DIR), env_filter());
    subscriber.init();
    Some(guard)
}
