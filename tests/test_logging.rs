//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle
//! log format parsing and configuration from environment variables.

use soilwatch::observability::logging::{init_logging, parse_level, parse_spans, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_json() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Json"), LogFormat::Json);
}

#[test]
fn test_log_format_parse_pretty() {
    assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_compact() {
    assert_eq!(LogFormat::parse("invalid"), LogFormat::Compact);
    assert_eq!(LogFormat::parse("yaml"), LogFormat::Compact);
    assert_eq!(LogFormat::parse("123"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_whitespace() {
    assert_eq!(LogFormat::parse("  json  "), LogFormat::Json);
    assert_eq!(LogFormat::parse("json\n"), LogFormat::Json);
    assert_eq!(LogFormat::parse("\tpretty"), LogFormat::Pretty);
}

#[test]
fn test_log_level_parsing() {
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level(" WARN "), Level::WARN);
    assert_eq!(parse_level("verbose"), Level::INFO);
}

#[test]
fn test_log_spans_parsing() {
    assert!(parse_spans("true"));
    assert!(parse_spans("True"));
    assert!(!parse_spans("on"));
}

#[test]
fn test_init_logging_only_installs_once() {
    // The first call in this test binary installs the global subscriber
    let first = init_logging(Level::INFO, LogFormat::Compact, false);
    let second = init_logging(Level::DEBUG, LogFormat::Json, true);

    assert!(first);
    assert!(!second);
    tracing::info!("logging initialized for test");
}
