//! Message types exchanged with the broker
//!
//! Inbound telemetry, outbound commands, topic filters and the typed
//! soil-moisture status report carried on the status topic.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// MQTT delivery guarantee level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    /// QoS 0, the only level this client exercises
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("QoS must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Subscription pattern with its requested QoS
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicFilter {
    pub pattern: String,
    #[serde(default)]
    pub qos: QoS,
}

impl TopicFilter {
    pub fn new(pattern: impl Into<String>, qos: QoS) -> Self {
        Self {
            pattern: pattern.into(),
            qos,
        }
    }

    /// Filter at QoS 0
    pub fn at_most_once(pattern: impl Into<String>) -> Self {
        Self::new(pattern, QoS::AtMostOnce)
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.pattern, u8::from(self.qos))
    }
}

/// Message delivered by the broker
///
/// Consumed immediately by the session's dispatch loop and never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retained: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, retained: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retained,
        }
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Display line handed to the observer: `<topic>: <payload>(<retained>)`
    pub fn display_line(&self) -> String {
        format!("{}: {}({})", self.topic, self.payload_text(), self.retained)
    }

    /// True when the payload is the flood alarm keyword, ignoring ASCII case
    pub fn is_flood_alert(&self) -> bool {
        self.payload.eq_ignore_ascii_case(FLOOD_KEYWORD.as_bytes())
    }
}

/// Payload that triggers the emergency disconnect
pub const FLOOD_KEYWORD: &str = "flood";

/// Irrigation state reported by the controller device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WateringState {
    On,
    Off,
}

/// Soil-moisture report published on the status topic
///
/// ```
/// use soilwatch::protocol::{MoistureStatus, WateringState};
///
/// let status = MoistureStatus::parse(br#"{"moisture level": 15, "is watering": "off"}"#).unwrap();
/// assert_eq!(status.moisture_level, 15.0);
/// assert_eq!(status.is_watering, WateringState::Off);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoistureStatus {
    #[serde(rename = "moisture level")]
    pub moisture_level: f64,
    #[serde(rename = "is watering")]
    pub is_watering: WateringState,
}

impl MoistureStatus {
    /// Parse a status payload; any schema mismatch is a [`StatusParseError`]
    pub fn parse(payload: &[u8]) -> Result<Self, StatusParseError> {
        let status: MoistureStatus = serde_json::from_slice(payload)?;
        if !status.moisture_level.is_finite() {
            return Err(StatusParseError::NonFiniteLevel);
        }
        Ok(status)
    }
}

/// Status payload parse failures
#[derive(Debug, Error)]
pub enum StatusParseError {
    #[error("invalid moisture status payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("moisture level is not a finite number")]
    NonFiniteLevel,
}

/// Command understood by the irrigation controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterCommand {
    On,
    Off,
}

impl WaterCommand {
    pub fn as_payload(&self) -> &'static str {
        match self {
            WaterCommand::On => "WATER ON",
            WaterCommand::Off => "WATER OFF",
        }
    }

    /// Watering state the device should report once the command is applied
    pub fn target_state(&self) -> WateringState {
        match self {
            WaterCommand::On => WateringState::On,
            WaterCommand::Off => WateringState::Off,
        }
    }
}

/// Message to publish, produced by automation or by direct user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundCommand {
    pub topic: String,
    pub payload: String,
}

impl OutboundCommand {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Per-topic outcome of a publish call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub topic: String,
    pub success: bool,
}
