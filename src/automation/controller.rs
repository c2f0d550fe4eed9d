//! Irrigation automation and flood safety decisions
//!
//! The controller never performs I/O. It turns each inbound message into an
//! [`Evaluation`] that the session carries out, and is told afterwards
//! whether the command it asked for actually went out.

use crate::protocol::{
    InboundMessage, MoistureStatus, OutboundCommand, TopicScheme, WaterCommand, WateringState,
};
use thiserror::Error;
use tracing::{debug, info};

/// Dead-band limits for moisture readings
///
/// Readings strictly below `low` call for watering, readings strictly above
/// `high` call for it to stop. Both limits sit inside the inert band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    low: f64,
    high: f64,
}

impl Thresholds {
    pub fn new(low: f64, high: f64) -> Result<Self, ThresholdError> {
        if !low.is_finite() || !high.is_finite() {
            return Err(ThresholdError::NotFinite);
        }
        if low > high {
            return Err(ThresholdError::Inverted { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Command called for by a reading, before considering what was already sent
    pub fn decide(&self, status: &MoistureStatus) -> Option<WaterCommand> {
        if status.moisture_level > self.high && status.is_watering != WateringState::Off {
            Some(WaterCommand::Off)
        } else if status.moisture_level < self.low && status.is_watering == WateringState::Off {
            Some(WaterCommand::On)
        } else {
            None
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 20.0,
            high: 30.0,
        }
    }
}

/// Threshold validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("thresholds must be finite numbers")]
    NotFinite,
    #[error("low threshold {low} is above high threshold {high}")]
    Inverted { low: f64, high: f64 },
}

/// What the session should do in response to one inbound message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evaluation {
    /// Command to publish, already addressed to the control topic
    pub command: Option<(WaterCommand, OutboundCommand)>,
    /// Parse failure on the status topic
    pub malformed: Option<String>,
    /// Payload was the flood alarm
    pub flood: bool,
}

impl Evaluation {
    pub fn is_noop(&self) -> bool {
        self.command.is_none() && self.malformed.is_none() && !self.flood
    }
}

/// Reactive controller for one installation's topics
#[derive(Debug, Clone)]
pub struct AutomationController {
    scheme: TopicScheme,
    thresholds: Thresholds,
    enabled: bool,
    /// Last command that went out and has not yet been reflected in a reading
    pending: Option<WaterCommand>,
}

impl AutomationController {
    pub fn new(scheme: TopicScheme, thresholds: Thresholds) -> Self {
        Self {
            scheme,
            thresholds,
            enabled: true,
            pending: None,
        }
    }

    /// Disable moisture automation; flood handling always stays active
    pub fn with_automation(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn scheme(&self) -> &TopicScheme {
        &self.scheme
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn pending(&self) -> Option<WaterCommand> {
        self.pending
    }

    /// Evaluate one inbound message
    pub fn evaluate(&mut self, message: &InboundMessage) -> Evaluation {
        let mut evaluation = Evaluation {
            flood: message.is_flood_alert(),
            ..Default::default()
        };

        // Safety override wins over any irrigation change
        if evaluation.flood || !self.enabled || message.topic != self.scheme.status_topic() {
            return evaluation;
        }

        match MoistureStatus::parse(&message.payload) {
            Ok(status) => {
                evaluation.command = self
                    .next_command(&status)
                    .map(|cmd| (cmd, self.outbound(cmd)));
            }
            Err(e) => {
                evaluation.malformed = Some(e.to_string());
            }
        }

        evaluation
    }

    /// Record whether a command asked for by [`evaluate`](Self::evaluate) was sent
    ///
    /// A failed send is forgotten so the next reading is evaluated afresh.
    pub fn record_outcome(&mut self, command: WaterCommand, sent: bool) {
        self.pending = if sent { Some(command) } else { None };
    }

    /// Forget issued commands, e.g. after the session reconnects
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Control message for a command
    pub fn outbound(&self, command: WaterCommand) -> OutboundCommand {
        OutboundCommand::new(self.scheme.control_topic(), command.as_payload())
    }

    fn next_command(&mut self, status: &MoistureStatus) -> Option<WaterCommand> {
        if let Some(pending) = self.pending {
            if status.is_watering == pending.target_state() {
                debug!(?pending, "device reached commanded state");
                self.pending = None;
            }
        }

        let desired = self.thresholds.decide(status)?;
        if self.pending == Some(desired) {
            debug!(
                ?desired,
                moisture_level = status.moisture_level,
                "command already issued, waiting for device"
            );
            return None;
        }

        info!(
            command = desired.as_payload(),
            moisture_level = status.moisture_level,
            is_watering = ?status.is_watering,
            "moisture outside dead band"
        );
        Some(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> AutomationController {
        AutomationController::new(TopicScheme::new("X").unwrap(), Thresholds::default())
    }

    fn status_message(level: f64, watering: &str) -> InboundMessage {
        InboundMessage::new(
            "public/X/soil moisture/status",
            format!(r#"{{"moisture level": {level}, "is watering": "{watering}"}}"#),
            false,
        )
    }

    fn command_of(evaluation: &Evaluation) -> Option<WaterCommand> {
        evaluation.command.as_ref().map(|(cmd, _)| *cmd)
    }

    #[test]
    fn test_thresholds_validation() {
        assert!(Thresholds::new(20.0, 30.0).is_ok());
        assert!(Thresholds::new(25.0, 25.0).is_ok());
        assert_eq!(
            Thresholds::new(31.0, 30.0),
            Err(ThresholdError::Inverted {
                low: 31.0,
                high: 30.0
            })
        );
        assert_eq!(
            Thresholds::new(f64::NAN, 30.0),
            Err(ThresholdError::NotFinite)
        );
    }

    #[test]
    fn test_boundaries_are_inert() {
        let thresholds = Thresholds::default();
        for (level, watering) in [
            (20.0, WateringState::Off),
            (20.0, WateringState::On),
            (30.0, WateringState::On),
            (30.0, WateringState::Off),
        ] {
            let status = MoistureStatus {
                moisture_level: level,
                is_watering: watering,
            };
            assert_eq!(thresholds.decide(&status), None, "{level} {watering:?}");
        }
    }

    #[test]
    fn test_dry_soil_turns_water_on() {
        let mut controller = controller();
        let evaluation = controller.evaluate(&status_message(15.0, "off"));

        let (command, outbound) = evaluation.command.unwrap();
        assert_eq!(command, WaterCommand::On);
        assert_eq!(outbound.topic, "public/X/soil moisture/control");
        assert_eq!(outbound.payload, "WATER ON");
    }

    #[test]
    fn test_wet_soil_turns_water_off() {
        let mut controller = controller();
        let evaluation = controller.evaluate(&status_message(35.0, "on"));
        assert_eq!(command_of(&evaluation), Some(WaterCommand::Off));
    }

    #[test]
    fn test_matching_state_issues_nothing() {
        let mut controller = controller();
        assert!(controller.evaluate(&status_message(35.0, "off")).is_noop());
        assert!(controller.evaluate(&status_message(15.0, "on")).is_noop());
    }

    #[test]
    fn test_sent_command_not_repeated_until_device_catches_up() {
        let mut controller = controller();

        let first = controller.evaluate(&status_message(35.0, "on"));
        assert_eq!(command_of(&first), Some(WaterCommand::Off));
        controller.record_outcome(WaterCommand::Off, true);

        let repeat = controller.evaluate(&status_message(35.0, "on"));
        assert!(repeat.is_noop());

        // Device confirms, then something turns watering back on
        assert!(controller.evaluate(&status_message(35.0, "off")).is_noop());
        assert_eq!(controller.pending(), None);
        let again = controller.evaluate(&status_message(35.0, "on"));
        assert_eq!(command_of(&again), Some(WaterCommand::Off));
    }

    #[test]
    fn test_failed_send_is_retried_on_next_reading() {
        let mut controller = controller();

        let first = controller.evaluate(&status_message(10.0, "off"));
        assert_eq!(command_of(&first), Some(WaterCommand::On));
        controller.record_outcome(WaterCommand::On, false);

        let second = controller.evaluate(&status_message(10.0, "off"));
        assert_eq!(command_of(&second), Some(WaterCommand::On));
    }

    #[test]
    fn test_malformed_status_reported() {
        let mut controller = controller();
        let message = InboundMessage::new("public/X/soil moisture/status", "garbage", false);
        let evaluation = controller.evaluate(&message);
        assert!(evaluation.command.is_none());
        assert!(evaluation.malformed.is_some());
        assert!(!evaluation.flood);
    }

    #[test]
    fn test_other_topics_not_parsed() {
        let mut controller = controller();
        let message = InboundMessage::new("public/X/temperature", "garbage", false);
        assert!(controller.evaluate(&message).is_noop());
    }

    #[test]
    fn test_flood_on_any_topic() {
        let mut controller = controller();
        for topic in ["public/X/soil moisture/status", "public/other", "alerts"] {
            let evaluation = controller.evaluate(&InboundMessage::new(topic, "FLOOD", false));
            assert!(evaluation.flood, "flood not detected on {topic}");
            assert!(evaluation.command.is_none());
            assert!(evaluation.malformed.is_none());
        }
    }

    #[test]
    fn test_disabled_automation_still_detects_flood() {
        let mut controller = controller().with_automation(false);
        assert!(controller.evaluate(&status_message(5.0, "off")).is_noop());
        assert!(controller
            .evaluate(&InboundMessage::new("public/X/soil moisture/status", "flood", false))
            .flood);
    }

    #[test]
    fn test_reset_forgets_pending() {
        let mut controller = controller();
        controller.record_outcome(WaterCommand::On, true);
        controller.reset();
        assert_eq!(controller.pending(), None);
    }
}
