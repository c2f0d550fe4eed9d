//! soilwatch - MQTT client session with soil moisture automation
//!
//! A single broker session that can publish, subscribe and print inbound
//! traffic, plus a reactive controller for one installation:
//!
//! - Moisture readings on `public/<scope>/soil moisture/status` outside the
//!   20..30 dead band produce `WATER ON` / `WATER OFF` on
//!   `public/<scope>/soil moisture/control`.
//! - A `flood` payload on any subscribed topic disconnects the session.
//!
//! # Quick Start
//!
//! ```rust
//! use soilwatch::automation::{AutomationController, Thresholds};
//! use soilwatch::protocol::{InboundMessage, TopicScheme, WaterCommand};
//!
//! let scheme = TopicScheme::new("X").unwrap();
//! let mut controller = AutomationController::new(scheme, Thresholds::default());
//!
//! let reading = InboundMessage::new(
//!     "public/X/soil moisture/status",
//!     r#"{"moisture level": 15, "is watering": "off"}"#,
//!     false,
//! );
//! let evaluation = controller.evaluate(&reading);
//! let (command, outbound) = evaluation.command.unwrap();
//!
//! assert_eq!(command, WaterCommand::On);
//! assert_eq!(outbound.topic, "public/X/soil moisture/control");
//! assert_eq!(outbound.payload, "WATER ON");
//! ```

pub mod automation;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;

pub use automation::{AutomationController, Thresholds};
pub use config::{AppConfig, ConfigError, ConnectionConfig};
pub use error::{ErrorKind, SessionError, SessionResult};
pub use protocol::*;
pub use session::{ConnectionState, Session, SessionObserver, TracingObserver};
pub use transport::mqtt::MqttTransport;
