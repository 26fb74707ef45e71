//! Logging initialization.
//!
//! Library crates only emit `tracing` events; binaries install the
//! subscriber once at startup through [`init_logging`].

use std::io;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const ENV_LOG_FORMAT: &str = "TOKENKEEPER_LOG_FORMAT";

/// Output format of the stderr log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Read `TOKENKEEPER_LOG_FORMAT`; anything but `json` is compact.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(ENV_LOG_FORMAT).ok().as_deref())
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("json") | Some("jsonl") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Initialize logging to stderr.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this more
/// than once keeps the first subscriber.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("tokenkeeper started");
/// ```
pub fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).as_str().to_ascii_lowercase()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match LogFormat::from_env() {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .compact()
                    .with_writer(io::stderr),
            )
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(level = %level, "logging initialized");
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
