//! Utilities for logging.

use std::io;

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Multi-field human readable output, includes targets and thread ids.
    #[default]
    HumanReadable,
    /// One json object per line.
    Json,
    /// Single line output without targets.
    Compact,
}

/// Configure the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this more than
/// once is a no-op, the first subscriber wins.
pub fn configure_global_logger<W>(level: Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);

    let _ = match format {
        LogFormat::HumanReadable => builder
            .with_target(true)
            .with_thread_ids(true)
            .try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    };
}

/// Logger for tests, writes through the test harness capture.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Convenience for binaries that log to stderr.
pub fn configure_stderr_logger(level: Level, format: LogFormat) {
    configure_global_logger(level, format, io::stderr);
}
