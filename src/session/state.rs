//! Pure connection state machine
//!
//! Transitions are computed by [`StateMachine::determine_next_state`] without
//! touching the session, so every edge can be tested in isolation.

use std::fmt;
use tracing::{error, info, warn};

/// Lifecycle of the broker session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Connect attempt or live connection failed; carries the cause
    Failed(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

/// Inputs that can move the session between states
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// `connect` was called with a valid config
    ConnectRequested,
    /// Broker answered with a CONNACK return code
    AckReceived(u8),
    /// Transport could not connect, or an established connection dropped
    TransportLost(String),
    /// `disconnect` was called
    DisconnectRequested,
    /// Flood alert forced the session down
    FloodDetected,
}

/// Pure state transition logic
pub struct StateMachine;

impl StateMachine {
    /// Determine the state after an event (pure function)
    ///
    /// Returns `None` when the event does not apply to the current state,
    /// e.g. a late acknowledgement after the user already disconnected.
    pub fn determine_next_state(
        current: &ConnectionState,
        event: &SessionEvent,
    ) -> Option<ConnectionState> {
        use ConnectionState::*;

        match (current, event) {
            (_, SessionEvent::ConnectRequested) => Some(Connecting),
            (Connecting, SessionEvent::AckReceived(0)) => Some(Connected),
            (Connecting, SessionEvent::AckReceived(code)) => Some(Failed(format!(
                "broker refused connection: {} (code {code})",
                crate::transport::describe_return_code(*code)
            ))),
            (Connecting | Connected, SessionEvent::TransportLost(reason)) => {
                Some(Failed(reason.clone()))
            }
            (Disconnected, SessionEvent::DisconnectRequested | SessionEvent::FloodDetected) => {
                None
            }
            (_, SessionEvent::DisconnectRequested | SessionEvent::FloodDetected) => {
                Some(Disconnected)
            }
            _ => None,
        }
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("Broker connection established");
            }
            (ConnectionState::Connected, ConnectionState::Failed(reason)) => {
                warn!("Broker connection lost: {}", reason);
            }
            (_, ConnectionState::Failed(reason)) => {
                error!("Connection failed: {}", reason);
            }
            _ => {
                info!("Session state: {} -> {}", from, to);
            }
        }
    }
}
