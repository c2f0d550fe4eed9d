//! Mock implementations for testing
//!
//! Provides an in-memory [`Transport`] and a recording [`SessionObserver`]
//! so session behavior can be tested without a broker.

use crate::config::ConnectionConfig;
use crate::error::ErrorKind;
use crate::protocol::{InboundMessage, PublishResult, QoS, TopicFilter};
use crate::session::{ConnectionState, SessionObserver};
use crate::transport::{EventSender, Transport, TransportEvent};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Lock a std mutex, recovering the data if a panicking test poisoned it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Failures produced by [`MockTransport`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockTransportError {
    #[error("mock transport is not connected")]
    NotConnected,
    #[error("scripted failure: {0}")]
    Scripted(String),
}

/// One payload handed to the mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl PublishedMessage {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Default)]
struct MockTransportState {
    connect_calls: Mutex<Vec<ConnectionConfig>>,
    published: Mutex<Vec<PublishedMessage>>,
    subscribe_calls: Mutex<Vec<Vec<TopicFilter>>>,
    disconnect_count: Mutex<usize>,
    failing_topics: Mutex<HashSet<String>>,
    fail_connect: Mutex<bool>,
    fail_subscribe: Mutex<bool>,
    events: Mutex<Option<EventSender>>,
}

/// Mock transport for testing
///
/// Clones share state, so a test can keep one handle while the session owns
/// another. Nothing is acknowledged automatically: tests drive the broker
/// side with [`acknowledge`](Self::acknowledge), [`deliver`](Self::deliver)
/// or [`emit`](Self::emit).
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockTransportState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `connect` fail
    pub fn fail_connect(&self) {
        *lock(&self.state.fail_connect) = true;
    }

    /// Make every subsequent publish to `topic` fail
    pub fn fail_publish_to(&self, topic: impl Into<String>) {
        lock(&self.state.failing_topics).insert(topic.into());
    }

    /// Make every subsequent `subscribe` fail
    pub fn fail_subscribe(&self) {
        *lock(&self.state.fail_subscribe) = true;
    }

    /// Whether a connection is currently open
    pub fn is_active(&self) -> bool {
        lock(&self.state.events).is_some()
    }

    /// Push an event to the session as if it came from the broker
    ///
    /// The event belongs to the connection opened by the latest `connect`.
    /// Returns false when no connection is open or the session is gone.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let sender = lock(&self.state.events).clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Answer the pending connect with a CONNACK return code
    pub async fn acknowledge(&self, return_code: u8) -> bool {
        self.emit(TransportEvent::ConnAck { return_code }).await
    }

    /// Deliver an inbound message
    pub async fn deliver(&self, topic: &str, payload: &str, retained: bool) -> bool {
        let message = InboundMessage::new(topic, payload.as_bytes().to_vec(), retained);
        self.emit(TransportEvent::Message(message)).await
    }

    /// Simulate the network dropping the connection
    pub async fn drop_connection(&self, reason: &str) -> bool {
        self.emit(TransportEvent::ConnectionLost {
            reason: reason.to_string(),
        })
        .await
    }

    pub fn connect_calls(&self) -> Vec<ConnectionConfig> {
        lock(&self.state.connect_calls).clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.state.published).clone()
    }

    pub fn subscribe_calls(&self) -> Vec<Vec<TopicFilter>> {
        lock(&self.state.subscribe_calls).clone()
    }

    pub fn disconnect_count(&self) -> usize {
        *lock(&self.state.disconnect_count)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(
        &self,
        config: &ConnectionConfig,
        _keep_alive: Duration,
        events: EventSender,
    ) -> Result<(), Self::Error> {
        lock(&self.state.connect_calls).push(config.clone());
        if *lock(&self.state.fail_connect) {
            return Err(MockTransportError::Scripted("connect".to_string()));
        }
        *lock(&self.state.events) = Some(events);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        *lock(&self.state.disconnect_count) += 1;
        lock(&self.state.events).take();
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Self::Error> {
        if !self.is_active() {
            return Err(MockTransportError::NotConnected);
        }
        if lock(&self.state.failing_topics).contains(topic) {
            return Err(MockTransportError::Scripted(format!("publish to {topic}")));
        }
        lock(&self.state.published).push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    async fn subscribe(&self, filters: &[TopicFilter]) -> Result<(), Self::Error> {
        if !self.is_active() {
            return Err(MockTransportError::NotConnected);
        }
        if *lock(&self.state.fail_subscribe) {
            return Err(MockTransportError::Scripted("subscribe".to_string()));
        }
        lock(&self.state.subscribe_calls).push(filters.to_vec());
        Ok(())
    }
}

/// Notification captured by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    StateChange(ConnectionState),
    Message(String),
    Publish(PublishResult),
    Subscribed(Vec<TopicFilter>),
    Warning(String),
    Error { kind: ErrorKind, message: String },
}

/// Observer that records every notification in order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        lock(&self.events).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    pub fn state_changes(&self) -> Vec<ConnectionState> {
        self.collect(|event| match event {
            ObservedEvent::StateChange(state) => Some(state.clone()),
            _ => None,
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.collect(|event| match event {
            ObservedEvent::Message(line) => Some(line.clone()),
            _ => None,
        })
    }

    pub fn publish_results(&self) -> Vec<PublishResult> {
        self.collect(|event| match event {
            ObservedEvent::Publish(result) => Some(result.clone()),
            _ => None,
        })
    }

    pub fn subscriptions(&self) -> Vec<Vec<TopicFilter>> {
        self.collect(|event| match event {
            ObservedEvent::Subscribed(filters) => Some(filters.clone()),
            _ => None,
        })
    }

    pub fn warnings(&self) -> Vec<String> {
        self.collect(|event| match event {
            ObservedEvent::Warning(message) => Some(message.clone()),
            _ => None,
        })
    }

    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.collect(|event| match event {
            ObservedEvent::Error { kind, .. } => Some(*kind),
            _ => None,
        })
    }

    fn collect<R>(&self, pick: impl Fn(&ObservedEvent) -> Option<R>) -> Vec<R> {
        lock(&self.events).iter().filter_map(pick).collect()
    }

    fn record(&self, event: ObservedEvent) {
        lock(&self.events).push(event);
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_change(&self, state: &ConnectionState) {
        self.record(ObservedEvent::StateChange(state.clone()));
    }

    fn on_message_received(&self, line: &str) {
        self.record(ObservedEvent::Message(line.to_string()));
    }

    fn on_publish_result(&self, result: &PublishResult) {
        self.record(ObservedEvent::Publish(result.clone()));
    }

    fn on_subscribe_confirmed(&self, filters: &[TopicFilter]) {
        self.record(ObservedEvent::Subscribed(filters.to_vec()));
    }

    fn on_warning(&self, message: &str) {
        self.record(ObservedEvent::Warning(message.to_string()));
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.record(ObservedEvent::Error {
            kind,
            message: message.to_string(),
        });
    }
}
