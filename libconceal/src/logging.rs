//! Logging setup shared by the library and its tools
//!
//! Everything is written to stderr so that stdout stays free for snapshots
//! and other machine-readable output. Filtering applies `level` to the
//! conceal crates only; dependencies stay at `warn`. `RUST_LOG`, when set,
//! replaces the computed filter entirely.
//!
//! # Examples
//!
//! ```no_run
//! use libconceal::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info".to_string(), false).init();
//!
//! // Or take everything from CONCEAL_LOG_FORMAT / CONCEAL_LOG_LEVEL
//! libconceal::logging::init_default();
//! ```

use std::str::FromStr;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Selects the output format
pub const FORMAT_ENV: &str = "CONCEAL_LOG_FORMAT";
/// Selects the level for the conceal crates
pub const LEVEL_ENV: &str = "CONCEAL_LOG_LEVEL";

const CRATES: [&str; 2] = ["libconceal", "conceal_replay"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain single-line records
    Text,
    /// One JSON object per record
    Json,
    /// Multi-line, colored records for local debugging
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!(
                "unknown log format '{}' (expected text, json or pretty)",
                other
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Forces `debug` for the conceal crates regardless of `level`
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Settings taken from `CONCEAL_LOG_FORMAT` and `CONCEAL_LOG_LEVEL`
    ///
    /// Unset or unparsable values fall back to text at `info`.
    pub fn from_env() -> Self {
        let format = std::env::var(FORMAT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

        Self::new(format, level, false)
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn directive(&self) -> String {
        let level = if self.verbose { "debug" } else { self.level.as_str() };
        let mut directive = String::from("warn");
        for name in CRATES {
            directive.push_str(&format!(",{}={}", name, level));
        }
        directive
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.directive()))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self.format {
            LogFormat::Json => fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(std::io::stderr)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .boxed(),
            LogFormat::Text => fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .boxed(),
        }
    }

    /// Install the global subscriber
    ///
    /// Only the first call in a process takes effect.
    pub fn init(&self) {
        let installed = tracing_subscriber::registry()
            .with(self.layer())
            .with(self.filter())
            .try_init();

        if installed.is_err() {
            tracing::debug!(format = %self.format, "global subscriber already set");
        }
    }
}

/// Initialize logging from `CONCEAL_LOG_FORMAT` and `CONCEAL_LOG_LEVEL`
pub fn init_default() {
    LoggingConfig::from_env().init();
}
