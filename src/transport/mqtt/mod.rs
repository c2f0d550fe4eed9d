//! MQTT transport built on rumqttc
//!
//! The module separates pure functions from I/O for testability:
//!
//! - [`connection`] - Pure option building and code/QoS mapping
//! - [`message_handler`] - Pure routing of rumqttc events
//! - [`client`] - Impure I/O: the client handle and its event loop task
//!
//! # Usage
//!
//! ```rust,no_run
//! use soilwatch::config::ConnectionConfig;
//! use soilwatch::transport::{mqtt::MqttTransport, EventSender, Transport};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = MqttTransport::new();
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(64);
//! let config = ConnectionConfig::new("localhost", 1883, "soilwatch-center-demo");
//!
//! transport
//!     .connect(&config, Duration::from_secs(60), EventSender::new(1, events_tx))
//!     .await?;
//! let first_event = events_rx.recv().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttTransport;
pub use connection::MqttError;
pub use message_handler::{EventRoute, MessageHandler};
