//! Reactive irrigation automation
//!
//! Moisture readings outside the dead band produce `WATER ON` / `WATER OFF`
//! commands; a flood alert on any topic requests an emergency disconnect.

pub mod controller;

pub use controller::{AutomationController, Evaluation, ThresholdError, Thresholds};
