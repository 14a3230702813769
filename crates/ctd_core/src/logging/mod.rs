//! Logging infrastructure.
//!
//! - `init_tracing` sets up the process-wide subscriber (stderr plus an
//!   optional daily log file)
//! - `CastLogger` writes one log file per cast
//!
//! # Example
//!
//! ```no_run
//! use ctd_core::logging::{init_tracing, CastLogger, LogConfig, LogLevel};
//!
//! let _guard = init_tracing(LogLevel::Info, Some(std::path::Path::new("logs")));
//!
//! let logger = CastLogger::new("WQP143", "logs", LogConfig::default(), None).unwrap();
//! logger.phase("Setup");
//! logger.command("FilterW /i... /s");
//! logger.success("Cast processed");
//! ```

mod cast_logger;
mod types;

use std::path::Path;

pub use cast_logger::CastLogger;
pub use types::{LineCallback, LogConfig, LogLevel, MessagePrefix};

pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name prefix of the daily application log.
const APP_LOG_PREFIX: &str = "ctd-proc.log";

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`, falling back to `default_level`. Logs go to stderr
/// and, with `log_dir`, to a daily-rolling file. Keep the returned guard
/// alive until exit so buffered file output is flushed.
pub fn init_tracing(default_level: LogLevel, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, APP_LOG_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    guard
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}
