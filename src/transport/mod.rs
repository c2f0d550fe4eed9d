//! Transport layer for the broker connection
//!
//! The session consumes the [`Transport`] trait; [`mqtt::MqttTransport`] is
//! the rumqttc-backed implementation and `testing::MockTransport` the
//! in-memory one. Connection acknowledgements and inbound messages are
//! delivered as [`TransportEvent`]s through the [`EventSender`] passed to
//! `connect`, which stamps them with the id of that connect attempt.

use crate::config::ConnectionConfig;
use crate::protocol::{InboundMessage, QoS, TopicFilter};
use std::time::Duration;
use tokio::sync::mpsc;

pub mod mqtt;

/// Capacity of the event channel between transport and session
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events produced by the transport's background task
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker answered the connect request; 0 means accepted
    ConnAck { return_code: u8 },
    /// Message received on a subscribed filter
    Message(InboundMessage),
    /// Broker confirmed a subscribe request
    SubAck { packet_id: u16 },
    /// Network or protocol failure; the transport is no longer active
    ConnectionLost { reason: String },
}

/// Transport event stamped with the connect attempt that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub connection_id: u64,
    pub event: TransportEvent,
}

/// Sending half of the session's event channel for one connect attempt
///
/// Every connect gets a fresh id, so events still queued from an earlier
/// connection can be told apart from those of the current one.
#[derive(Debug, Clone)]
pub struct EventSender {
    connection_id: u64,
    tx: mpsc::Sender<TaggedEvent>,
}

impl EventSender {
    pub fn new(connection_id: u64, tx: mpsc::Sender<TaggedEvent>) -> Self {
        Self { connection_id, tx }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Queue an event, waiting for capacity; fails once the session is gone
    pub async fn send(
        &self,
        event: TransportEvent,
    ) -> Result<(), mpsc::error::SendError<TransportEvent>> {
        self.tx
            .send(TaggedEvent {
                connection_id: self.connection_id,
                event,
            })
            .await
            .map_err(|mpsc::error::SendError(tagged)| mpsc::error::SendError(tagged.event))
    }
}

/// Human-readable meaning of an MQTT 3.1.1 CONNACK return code
pub fn describe_return_code(return_code: u8) -> &'static str {
    match return_code {
        0 => "connection accepted",
        1 => "unacceptable protocol version",
        2 => "client identifier rejected",
        3 => "server unavailable",
        4 => "bad user name or password",
        5 => "not authorized",
        _ => "unknown return code",
    }
}

/// Transport trait for the broker connection
///
/// All methods take `&self` so the session can publish from its dispatch
/// loop while the foreground issues subscribe or disconnect calls.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start connecting; the outcome arrives later as `ConnAck` or `ConnectionLost`
    async fn connect(
        &self,
        config: &ConnectionConfig,
        keep_alive: Duration,
        events: EventSender,
    ) -> Result<(), Self::Error>;

    /// Disconnect from the broker and stop delivering events
    async fn disconnect(&self) -> Result<(), Self::Error>;

    /// Publish one payload to one topic
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Self::Error>;

    /// Subscribe to a batch of filters in a single request
    async fn subscribe(&self, filters: &[TopicFilter]) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_return_code() {
        assert_eq!(describe_return_code(0), "connection accepted");
        assert_eq!(describe_return_code(4), "bad user name or password");
        assert_eq!(describe_return_code(42), "unknown return code");
    }

    #[tokio::test]
    async fn test_event_sender_stamps_connection_id() {
        let (tx, mut rx) = mpsc::channel(4);
        let first = EventSender::new(1, tx.clone());
        let second = EventSender::new(2, tx);

        first.send(TransportEvent::SubAck { packet_id: 7 }).await.unwrap();
        second.send(TransportEvent::ConnAck { return_code: 0 }).await.unwrap();

        assert_eq!(rx.recv().await.map(|t| t.connection_id), Some(1));
        let tagged = rx.recv().await.unwrap();
        assert_eq!(tagged.connection_id, 2);
        assert_eq!(tagged.event, TransportEvent::ConnAck { return_code: 0 });
    }

    #[tokio::test]
    async fn test_event_sender_returns_event_when_session_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(3, tx);

        let error = sender
            .send(TransportEvent::SubAck { packet_id: 1 })
            .await
            .unwrap_err();
        assert_eq!(error.0, TransportEvent::SubAck { packet_id: 1 });
    }
}
