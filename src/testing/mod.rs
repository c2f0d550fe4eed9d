//! Testing utilities and mock implementations
//!
//! Lets session behavior be exercised without a running MQTT broker.

pub mod mocks;

pub use mocks::*;
