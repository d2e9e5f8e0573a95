use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console plus daily-rolling JSON file logging under `log_dir`.
///
/// The returned guard must live until exit or buffered file lines are lost.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("could not create log dir {}: {}", log_dir.display(), e);
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "pnatrans.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pnatrans_etl=info,pnatrans=info"));

    // A second init (tests, embedding) keeps the first subscriber.
    match tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
    {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}
