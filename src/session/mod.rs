//! Broker session: connection lifecycle, subscriptions and inbound dispatch
//!
//! A [`Session`] owns one [`Transport`]. Foreground calls (`connect`,
//! `subscribe`, `publish`, `disconnect`) may run concurrently with the
//! dispatch loop started by [`Session::run`], which drains transport events
//! one at a time. Connection state lives in a watch channel so front ends can
//! await transitions instead of polling.

pub mod observer;
pub mod publisher;
pub mod registry;
pub mod state;

pub use observer::{SessionObserver, TracingObserver};
pub use registry::SubscriptionRegistry;
pub use state::{ConnectionState, SessionEvent, StateMachine};

use crate::automation::AutomationController;
use crate::config::ConnectionConfig;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{InboundMessage, TopicFilter};
use crate::transport::{
    EventSender, TaggedEvent, Transport, TransportEvent, EVENT_CHANNEL_CAPACITY,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn, Instrument};

/// Default MQTT keep-alive interval
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// One client session against one broker
pub struct Session<T: Transport> {
    transport: T,
    observer: Arc<dyn SessionObserver>,
    state_tx: watch::Sender<ConnectionState>,
    registry: Mutex<SubscriptionRegistry>,
    controller: Mutex<AutomationController>,
    events_tx: mpsc::Sender<TaggedEvent>,
    events_rx: Mutex<mpsc::Receiver<TaggedEvent>>,
    /// Id of the latest connect attempt; events tagged otherwise are stale
    connection_id: AtomicU64,
    keep_alive: Duration,
}

impl<T: Transport> Session<T> {
    pub fn new(
        transport: T,
        controller: AutomationController,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            transport,
            observer,
            state_tx,
            registry: Mutex::new(SubscriptionRegistry::default()),
            controller: Mutex::new(controller),
            events_tx,
            events_rx: Mutex::new(events_rx),
            connection_id: AtomicU64::new(0),
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state_tx.borrow().is_connected()
    }

    /// Watch receiver for state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Filters subscribed on the current connection, default filter first
    pub async fn active_filters(&self) -> Vec<TopicFilter> {
        self.registry.lock().await.active_filters()
    }

    /// Start connecting to the broker
    ///
    /// Returns once the transport accepted the request; the outcome arrives
    /// through the dispatch loop as a state change to `Connected` or `Failed`.
    /// Invalid configs are rejected before any state change. Each attempt
    /// starts with an empty registry and discards events still queued from
    /// earlier connections.
    pub async fn connect(&self, config: &ConnectionConfig) -> SessionResult<()> {
        config.validate()?;

        self.controller.lock().await.reset();
        self.registry.lock().await.clear();
        let connection_id = self.connection_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.transition(SessionEvent::ConnectRequested);

        let events = EventSender::new(connection_id, self.events_tx.clone());
        if let Err(e) = self
            .transport
            .connect(config, self.keep_alive, events)
            .instrument(crate::mqtt_span!(operation = "connect", host = %config.host, port = config.port))
            .await
        {
            let error = SessionError::transport_failure(e.to_string());
            self.transition(SessionEvent::TransportLost(error.to_string()));
            self.report_error(&error);
            return Err(error);
        }

        info!(host = %config.host, port = config.port, client_id = %config.client_id, "Connect requested");
        Ok(())
    }

    /// Wait until the pending connect attempt resolves
    ///
    /// A timeout moves the session to `Failed` and tears down the transport.
    pub async fn wait_until_connected(&self, timeout: Duration) -> SessionResult<()> {
        let mut state_rx = self.state_tx.subscribe();

        let outcome = tokio::time::timeout(timeout, async {
            loop {
                let state = state_rx.borrow_and_update().clone();
                match state {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Failed(reason) => {
                        return Err(SessionError::transport_failure(reason))
                    }
                    ConnectionState::Disconnected => return Err(SessionError::NotConnected),
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(SessionError::transport_failure("state channel closed"));
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                let error = SessionError::transport_failure(format!(
                    "no connection acknowledgement within {}s",
                    timeout.as_secs()
                ));
                if self.transition(SessionEvent::TransportLost(error.to_string())) {
                    self.report_error(&error);
                }
                self.stop_transport().await;
                Err(error)
            }
        }
    }

    /// Disconnect from the broker; a no-op when already disconnected
    pub async fn disconnect(&self) {
        self.transition(SessionEvent::DisconnectRequested);
        self.stop_transport().await;
    }

    /// Subscribe to the default filter and then to the accumulated user filters
    ///
    /// Empty patterns are dropped before the empty check. Each subscribe call
    /// is confirmed to the observer separately.
    pub async fn subscribe(&self, filters: Vec<TopicFilter>) -> SessionResult<()> {
        self.ensure_connected()?;

        let filters: Vec<TopicFilter> = filters
            .into_iter()
            .filter(|filter| !filter.pattern.trim().is_empty())
            .collect();
        if filters.is_empty() {
            return Err(SessionError::EmptyFilter);
        }

        let default_filter = {
            let mut registry = self.registry.lock().await;
            registry.activate_default();
            registry.default_filter().clone()
        };
        self.subscribe_batch(std::slice::from_ref(&default_filter))
            .await?;

        let user_filters = {
            let mut registry = self.registry.lock().await;
            registry.extend(filters);
            registry.user_filters().to_vec()
        };
        self.subscribe_batch(&user_filters).await
    }

    /// Process transport events until the event channel closes
    ///
    /// Only one dispatch loop runs at a time; a second call waits for the
    /// first to finish. Dropping the returned future stops dispatching
    /// without losing queued events.
    pub async fn run(&self) {
        let mut events_rx = self.events_rx.lock().await;
        debug!("Dispatch loop started");
        while let Some(tagged) = events_rx.recv().await {
            self.dispatch(tagged).await;
        }
        debug!("Dispatch loop stopped");
    }

    /// Process events that are already queued, without waiting for more
    pub async fn dispatch_pending(&self) -> usize {
        let mut events_rx = self.events_rx.lock().await;
        let mut handled = 0;
        while let Ok(tagged) = events_rx.try_recv() {
            self.dispatch(tagged).await;
            handled += 1;
        }
        handled
    }

    async fn dispatch(&self, tagged: TaggedEvent) {
        let current = self.connection_id.load(Ordering::SeqCst);
        if tagged.connection_id != current {
            debug!(
                connection_id = tagged.connection_id,
                current, "Dropping event from an earlier connection"
            );
            return;
        }
        self.handle_event(tagged.event).await;
    }

    /// React to one transport event of the current connection
    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::ConnAck { return_code } => {
                let event = SessionEvent::AckReceived(return_code);
                let changed = self.transition(event);
                if changed && return_code != 0 {
                    if let ConnectionState::Failed(reason) = self.connection_state() {
                        self.report_error(&SessionError::transport_failure(reason));
                    }
                    self.stop_transport().await;
                } else if !changed {
                    debug!(return_code, "Ignoring acknowledgement outside Connecting");
                }
            }
            TransportEvent::ConnectionLost { reason } => {
                if self.transition(SessionEvent::TransportLost(reason.clone())) {
                    self.report_error(&SessionError::transport_failure(reason));
                    self.stop_transport().await;
                } else {
                    debug!(%reason, "Ignoring connection loss outside an active session");
                }
            }
            TransportEvent::SubAck { packet_id } => {
                debug!(packet_id, "Subscription acknowledged by broker");
            }
            TransportEvent::Message(message) => self.route_message(message).await,
        }
    }

    async fn route_message(&self, message: InboundMessage) {
        if !self.is_connected() {
            debug!(topic = %message.topic, "Dropping message received while not connected");
            return;
        }

        self.observer.on_message_received(&message.display_line());

        let evaluation = {
            let mut controller = self.controller.lock().await;
            crate::automation_span!(topic = %message.topic)
                .in_scope(|| controller.evaluate(&message))
        };
        if evaluation.is_noop() {
            return;
        }

        if let Some(reason) = evaluation.malformed {
            self.report_error(&SessionError::malformed_payload(reason));
        }

        if evaluation.flood {
            self.emergency_disconnect().await;
            return;
        }

        if let Some((command, outbound)) = evaluation.command {
            let result = self.publish_command(&outbound).await;
            self.controller
                .lock()
                .await
                .record_outcome(command, result.success);
        }
    }

    async fn emergency_disconnect(&self) {
        let warning = SessionError::EmergencyDisconnect.to_string();
        warn!("{}", warning);
        self.observer.on_warning(&warning);
        self.transition(SessionEvent::FloodDetected);
        self.stop_transport().await;
    }

    async fn subscribe_batch(&self, filters: &[TopicFilter]) -> SessionResult<()> {
        match self.transport.subscribe(filters).await {
            Ok(()) => {
                self.observer.on_subscribe_confirmed(filters);
                Ok(())
            }
            Err(e) => {
                let listed: Vec<&str> = filters.iter().map(|f| f.pattern.as_str()).collect();
                let error = SessionError::transport_failure(format!(
                    "subscribe to {} failed: {e}",
                    listed.join(", ")
                ));
                self.report_error(&error);
                Err(error)
            }
        }
    }

    async fn stop_transport(&self) {
        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport did not disconnect cleanly: {}", e);
        }
    }

    fn ensure_connected(&self) -> SessionResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn report_error(&self, error: &SessionError) {
        self.observer.on_error(error.kind(), &error.to_string());
    }

    /// Apply an event to the state machine; returns whether the state changed
    fn transition(&self, event: SessionEvent) -> bool {
        let mut entered = None;
        self.state_tx.send_if_modified(|state| {
            match StateMachine::determine_next_state(state, &event) {
                Some(next) if next != *state => {
                    StateMachine::log_state_transition(state, &next);
                    *state = next.clone();
                    entered = Some(next);
                    true
                }
                _ => false,
            }
        });

        match entered {
            Some(state) => {
                self.observer.on_state_change(&state);
                true
            }
            None => false,
        }
    }
}
