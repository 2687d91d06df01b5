//! Diagnostic logging for the bridge.
//!
//! Stdout carries exactly one JSON response line, so every diagnostic is
//! written to stderr. `RUST_LOG` overrides the configured level.

use std::io;

use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    prelude::*,
    EnvFilter,
};
use tts_core::config::LoggingConfig;
use tts_core::{TtsError, TtsResult};

/// Logging format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}")),
        }
    }
}

/// Install the global subscriber described by the `[logging]` section.
pub fn init_from_config(config: &LoggingConfig) -> TtsResult<()> {
    let format: LogFormat = config.format.parse().map_err(TtsError::config)?;
    init_logging(&config.level, format);
    Ok(())
}

/// Install a global subscriber writing to stderr.
///
/// A second call is a no-op.
pub fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing::subscriber::set_global_default(build_subscriber(filter, format, io::stderr));
}

/// Build a subscriber for an arbitrary writer.
///
/// Event targets are kept; thread ids are not, as the bridge runs on one
/// thread.
pub fn build_subscriber<W>(
    filter: EnvFilter,
    format: LogFormat,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => Box::new(
            registry.with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            ),
        ),
        LogFormat::Json => Box::new(
            registry.with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            ),
        ),
    }
}
