//! Pure routing of rumqttc events into transport events
//!
//! This module decides what each rumqttc event means for the session without
//! touching the network.

use super::connection::connect_return_code;
use crate::protocol::InboundMessage;
use crate::transport::{describe_return_code, TransportEvent};
use rumqttc::{ConnectionError, Event, Outgoing, Packet};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    return_code: connect_return_code(connack.code),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived(InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.clone(),
                    retained: publish.retain,
                }),
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Map an event loop failure onto a transport event (pure function)
    ///
    /// A refused CONNACK keeps its return code so the session can tell a
    /// broker refusal from a network failure.
    pub fn route_connection_error(error: &ConnectionError) -> TransportEvent {
        match error {
            ConnectionError::ConnectionRefused(code) => {
                let return_code = connect_return_code(*code);
                tracing::debug!(
                    target: "mqtt_transport",
                    return_code,
                    "Connection refused: {}",
                    describe_return_code(return_code)
                );
                TransportEvent::ConnAck { return_code }
            }
            other => TransportEvent::ConnectionLost {
                reason: other.to_string(),
            },
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// Broker answered the connect request
    ConnectionAcknowledged { return_code: u8 },
    /// Message received on a subscribed topic
    MessageReceived(InboundMessage),
    /// Subscription confirmed
    SubscriptionConfirmed { packet_id: u16 },
    /// Broker closed the session
    Disconnected,
    /// Our DISCONNECT went out; the event loop can stop
    DisconnectSent,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

impl EventRoute {
    /// Event for the session, if this route concerns it
    pub fn into_transport_event(self) -> Option<TransportEvent> {
        match self {
            EventRoute::ConnectionAcknowledged { return_code } => {
                Some(TransportEvent::ConnAck { return_code })
            }
            EventRoute::MessageReceived(message) => Some(TransportEvent::Message(message)),
            EventRoute::SubscriptionConfirmed { packet_id } => {
                Some(TransportEvent::SubAck { packet_id })
            }
            EventRoute::Disconnected => Some(TransportEvent::ConnectionLost {
                reason: "Broker closed the connection".to_string(),
            }),
            EventRoute::DisconnectSent
            | EventRoute::InfrastructureEvent(_)
            | EventRoute::OutgoingEvent => None,
        }
    }

    /// True when the event loop has nothing more to deliver
    pub fn ends_session(&self) -> bool {
        matches!(self, EventRoute::Disconnected | EventRoute::DisconnectSent)
    }
}
