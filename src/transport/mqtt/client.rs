//! Impure I/O operations for the MQTT transport
//!
//! This module owns the rumqttc client and its event loop task. Events are
//! routed through [`MessageHandler`] and forwarded to the session channel.
//! The event loop stops on its first error: rumqttc would otherwise
//! reconnect on the next poll, and reconnecting is the session's decision.

use super::connection::{configure_mqtt_options, to_mqtt_qos, MqttError};
use super::message_handler::MessageHandler;
use crate::config::ConnectionConfig;
use crate::protocol::{QoS, TopicFilter};
use crate::transport::{EventSender, Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, SubscribeFilter};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of rumqttc's outgoing request queue
const REQUEST_CHANNEL_CAPACITY: usize = 32;

/// How long `disconnect` waits for the DISCONNECT packet to be flushed
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Handles of a live connection
struct ActiveConnection {
    client: AsyncClient,
    event_loop_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// rumqttc-backed transport
#[derive(Default)]
pub struct MqttTransport {
    active: Mutex<Option<ActiveConnection>>,
}

impl MqttTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone the client handle out of the lock so no lock is held across I/O
    async fn client(&self) -> Result<AsyncClient, MqttError> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.client.clone())
            .ok_or(MqttError::NotConnected)
    }

    /// Poll the rumqttc event loop until disconnect, first error or a dropped handle
    ///
    /// A shutdown request does not stop polling: the loop keeps running so
    /// the queued DISCONNECT is flushed, but stops forwarding events.
    async fn run_event_loop(
        mut event_loop: EventLoop,
        events: EventSender,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut closing = false;
        loop {
            tokio::select! {
                changed = shutdown_rx.changed(), if !closing => {
                    if changed.is_err() {
                        debug!(target: "mqtt_transport", "Shutdown handle dropped");
                        break;
                    }
                    closing = *shutdown_rx.borrow();
                    if closing {
                        debug!(target: "mqtt_transport", "Shutdown requested, flushing DISCONNECT");
                    }
                }
                result = event_loop.poll() => {
                    match result {
                        Ok(event) => {
                            let route = MessageHandler::route_mqtt_event(&event);
                            let ends_session = route.ends_session();
                            if let Some(transport_event) = route.into_transport_event() {
                                match deliver(&events, transport_event, &mut shutdown_rx).await {
                                    Delivery::Sent => {}
                                    Delivery::Closing => closing = true,
                                    Delivery::SessionGone => {
                                        debug!(target: "mqtt_transport", "Session dropped event channel");
                                        break;
                                    }
                                }
                            }
                            if ends_session {
                                break;
                            }
                        }
                        Err(e) if closing => {
                            debug!(target: "mqtt_transport", "Event loop closed during shutdown: {}", e);
                            break;
                        }
                        Err(e) => {
                            error!("MQTT event loop error: {}", e);
                            let lost = MessageHandler::route_connection_error(&e);
                            deliver(&events, lost, &mut shutdown_rx).await;
                            break;
                        }
                    }
                }
            }
        }
        info!(connection_id = events.connection_id(), "MQTT event loop stopped");
    }

    /// Stop an existing connection, flushing DISCONNECT when possible
    async fn shutdown(active: ActiveConnection) -> Result<(), MqttError> {
        let ActiveConnection {
            client,
            mut event_loop_handle,
            shutdown_tx,
        } = active;

        // try_disconnect never waits on a full request queue
        let result = client
            .try_disconnect()
            .map_err(|e| MqttError::DisconnectFailed(Box::new(e)));

        // The session may be the caller and not draining its channel
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(DISCONNECT_GRACE, &mut event_loop_handle).await {
            Ok(Ok(())) => debug!(target: "mqtt_transport", "Event loop shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Event loop didn't shut down gracefully, forcing abort");
                event_loop_handle.abort();
            }
        }

        result
    }
}

/// Outcome of handing one event to the session
#[derive(Debug, PartialEq, Eq)]
enum Delivery {
    Sent,
    /// Shutdown was requested; the event was dropped
    Closing,
    SessionGone,
}

/// Forward an event, giving up when shutdown is requested while the channel is full
async fn deliver(
    events: &EventSender,
    event: TransportEvent,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Delivery {
    if *shutdown_rx.borrow() {
        return Delivery::Closing;
    }
    tokio::select! {
        sent = events.send(event) => match sent {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::SessionGone,
        },
        _ = shutdown_rx.changed() => Delivery::Closing,
    }
}

#[async_trait]
impl Transport for MqttTransport {
    type Error = MqttError;

    async fn connect(
        &self,
        config: &ConnectionConfig,
        keep_alive: Duration,
        events: EventSender,
    ) -> Result<(), Self::Error> {
        let mqtt_options = configure_mqtt_options(config, keep_alive)?;

        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            info!("Replacing existing MQTT connection");
            if let Err(e) = Self::shutdown(previous).await {
                warn!("Previous connection did not close cleanly: {}", e);
            }
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connection_id = events.connection_id();
        let event_loop_handle = tokio::spawn(Self::run_event_loop(event_loop, events, shutdown_rx));

        info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            connection_id,
            "Connecting to MQTT broker"
        );

        *self.active.lock().await = Some(ActiveConnection {
            client,
            event_loop_handle,
            shutdown_tx,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Self::Error> {
        let active = self.active.lock().await.take();
        match active {
            Some(active) => {
                Self::shutdown(active).await?;
                info!("MQTT client disconnected");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Self::Error> {
        let client = self.client().await?;
        client
            .publish(topic, to_mqtt_qos(qos), false, payload.to_vec())
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(target: "mqtt_transport", "Published {} bytes to {}", payload.len(), topic);
        Ok(())
    }

    async fn subscribe(&self, filters: &[TopicFilter]) -> Result<(), Self::Error> {
        let client = self.client().await?;
        let mqtt_filters: Vec<SubscribeFilter> = filters
            .iter()
            .map(|f| SubscribeFilter::new(f.pattern.clone(), to_mqtt_qos(f.qos)))
            .collect();

        client
            .subscribe_many(mqtt_filters)
            .await
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;

        debug!(target: "mqtt_transport", "Subscribe request sent for {} filter(s)", filters.len());
        Ok(())
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        // Async disconnect is impossible here; only stop the background task
        if let Some(active) = self.active.get_mut().take() {
            let _ = active.shutdown_tx.send(true);
            active.event_loop_handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_operations_fail_before_connect() {
        let transport = MqttTransport::new();

        assert!(matches!(
            transport.publish("a", b"x", QoS::AtMostOnce).await,
            Err(MqttError::NotConnected)
        ));
        assert!(matches!(
            transport
                .subscribe(&[TopicFilter::at_most_once("public/#")])
                .await,
            Err(MqttError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let transport = MqttTransport::new();
        assert!(transport.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_connection_lost() {
        let transport = MqttTransport::new();
        let (tx, mut rx) = mpsc::channel(8);
        // Port 1 on localhost is reserved and refuses connections
        let config = ConnectionConfig::new("127.0.0.1", 1, "soilwatch-center-test");

        transport
            .connect(&config, Duration::from_secs(60), EventSender::new(1, tx))
            .await
            .unwrap();

        let tagged = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("event loop should report the failure")
            .expect("channel should stay open until the failure is sent");
        assert_eq!(tagged.connection_id, 1);
        assert!(matches!(tagged.event, TransportEvent::ConnectionLost { .. }));

        transport.disconnect().await.ok();
    }

    #[tokio::test]
    async fn test_deliver_sends_when_channel_has_room() {
        let (tx, mut rx) = mpsc::channel(1);
        let events = EventSender::new(4, tx);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let outcome = deliver(&events, TransportEvent::SubAck { packet_id: 1 }, &mut shutdown_rx).await;

        assert_eq!(outcome, Delivery::Sent);
        assert_eq!(rx.recv().await.map(|t| t.connection_id), Some(4));
    }

    #[tokio::test]
    async fn test_deliver_gives_up_on_full_channel_once_shutdown_requested() {
        let (tx, _rx) = mpsc::channel(1);
        let events = EventSender::new(1, tx);
        events
            .send(TransportEvent::SubAck { packet_id: 1 })
            .await
            .unwrap();
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let pending = deliver(&events, TransportEvent::SubAck { packet_id: 2 }, &mut shutdown_rx);
        tokio::pin!(pending);
        assert!(
            tokio::time::timeout(Duration::from_millis(20), &mut pending)
                .await
                .is_err(),
            "a full channel should block delivery"
        );

        shutdown_tx.send(true).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("shutdown should release a blocked delivery");
        assert_eq!(outcome, Delivery::Closing);
    }

    #[tokio::test]
    async fn test_deliver_drops_events_while_closing() {
        let (tx, mut rx) = mpsc::channel(1);
        let events = EventSender::new(1, tx);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(true);

        let outcome = deliver(&events, TransportEvent::SubAck { packet_id: 1 }, &mut shutdown_rx).await;

        assert_eq!(outcome, Delivery::Closing);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deliver_reports_dropped_session() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let events = EventSender::new(1, tx);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let outcome = deliver(&events, TransportEvent::SubAck { packet_id: 1 }, &mut shutdown_rx).await;

        assert_eq!(outcome, Delivery::SessionGone);
    }
}
