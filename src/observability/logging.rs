//! Structured logging using the tracing crate
//!
//! Logs go to stderr so they never interleave with the message lines the CLI
//! prints on stdout.
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: Log level (ERROR, WARN, INFO, DEBUG, TRACE) - defaults to INFO
//! - `LOG_FORMAT`: Output format (json, pretty, compact) - defaults to compact
//! - `LOG_SPANS`: Include span events (true/false) - defaults to false
//! - `RUST_LOG`: Override log filtering (follows env_logger format)
//!
//! ## Examples
//!
//! ```bash
//! # Machine-readable logs for a long-running controller
//! LOG_FORMAT=json LOG_LEVEL=INFO soilwatch run
//!
//! # Verbose terminal output while debugging automation
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG soilwatch run
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// JSON format for structured logging (machine-readable)
    Json,
    /// Pretty format with colors and indentation (human-readable)
    Pretty,
    /// Compact format with colors but minimal spacing (terminal-friendly)
    #[default]
    Compact,
}

impl LogFormat {
    /// Parse log format from string, falling back to compact
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::default(),
        }
    }
}

/// Parse a `LOG_LEVEL` value, falling back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "INFO" => Level::INFO,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Parse a `LOG_SPANS` value; only "true" enables span events
pub fn parse_spans(s: &str) -> bool {
    s.eq_ignore_ascii_case("true")
}

fn build_filter(level: Level) -> EnvFilter {
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }

    // Reduce noise from dependencies
    EnvFilter::new(format!("{level},rumqttc=warn,tokio=warn"))
}

/// Initialize logging with manual configuration
///
/// Returns false when a global subscriber was already installed, e.g. by an
/// earlier test in the same process.
pub fn init_logging(level: Level, format: LogFormat, include_spans: bool) -> bool {
    let span_events = if include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let subscriber = tracing_subscriber::registry().with(build_filter(level));

    let installed = match format {
        LogFormat::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events),
            )
            .try_init(),
        LogFormat::Compact => subscriber
            .with(
                fmt::layer()
                    .compact()
                    .with_ansi(true)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events),
            )
            .try_init(),
    };

    installed.is_ok()
}

/// Initialize logging from environment variables
///
/// `verbose` raises the default level to DEBUG unless `LOG_LEVEL` is set.
pub fn init_default_logging(verbose: bool) -> bool {
    let level = match env::var("LOG_LEVEL") {
        Ok(value) => parse_level(&value),
        Err(_) if verbose => Level::DEBUG,
        Err(_) => Level::INFO,
    };
    let format = env::var("LOG_FORMAT")
        .map(|value| LogFormat::parse(&value))
        .unwrap_or_default();
    let include_spans = env::var("LOG_SPANS")
        .map(|value| parse_spans(&value))
        .unwrap_or(false);

    init_logging(level, format, include_spans)
}

/// Create an MQTT operation span
#[macro_export]
macro_rules! mqtt_span {
    ($($field:tt)*) => {
        tracing::info_span!("mqtt_operation", $($field)*)
    };
}

/// Create an automation decision span
#[macro_export]
macro_rules! automation_span {
    ($($field:tt)*) => {
        tracing::info_span!("automation", $($field)*)
    };
}

pub use {automation_span, mqtt_span};
