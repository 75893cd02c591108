//! Tracing subscriber setup for the binary.

use std::fs;
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_PREFIX: &str = "revsync.log";

/// Log to stderr and to a daily file under `log_dir`.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Keep the returned
/// guard alive for the whole process, dropping it flushes the file writer.
pub fn init(log_dir: &Path) -> io::Result<WorkerGuard> {
  fs::create_dir_all(log_dir)?;
  let appender = tracing_appender::rolling::daily(log_dir, LOG_PREFIX);
  let (file_writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(io::stderr))
    .with(fmt::layer().with_ansi(false).with_writer(file_writer))
    .try_init()
    .map_err(io::Error::other)?;

  Ok(guard)
}
