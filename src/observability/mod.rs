//! Observability for the soilwatch session
//!
//! Structured logging setup and span macros. Session notifications meant for
//! users go through `session::SessionObserver` instead.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{automation_span, mqtt_span};
