//! Message and topic types for the soil-moisture session
//!
//! Typed payloads, topic filters and the topic naming scheme shared by the
//! session, the automation controller and the transport.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
