use file_sentinel::config::LogLevel;
use std::env;
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber: stdout always, plus a plain-text file
/// layer when `log_file_path` is set. Keep the returned guard alive for the
/// lifetime of the process so buffered file output is flushed.
pub fn init_logger(level: LogLevel, log_file_path: Option<&str>) -> Option<WorkerGuard> {
    // `TRACING_LEVEL` takes a full filter directive and wins over LOG_LEVEL.
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| level.as_filter().to_string());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_file_path {
        Some(path) => {
            let path = Path::new(path);
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| "file-sentinel.log".into());
            let file_appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .with_ansi(true),
        )
        .with(file_layer)
        .with(filter_layer)
        .init();

    match log_file_path {
        Some(path) => info!("Tracing is configured for stdout and {}", path),
        None => info!("Tracing is configured for stdout"),
    }

    guard
}
