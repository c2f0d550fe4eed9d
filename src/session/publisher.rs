//! Outbound publishing for the session

use super::Session;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{OutboundCommand, PublishResult, QoS};
use crate::transport::Transport;
use tracing::{debug, warn};

impl<T: Transport> Session<T> {
    /// Publish one message to each topic, in order
    ///
    /// Preconditions are checked before anything is sent. Once sending has
    /// started, a failing topic does not stop the rest; every topic gets a
    /// [`PublishResult`] both in the returned list and through the observer.
    pub async fn publish(
        &self,
        topics: &[String],
        message: &str,
    ) -> SessionResult<Vec<PublishResult>> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        if topics.is_empty() {
            return Err(SessionError::EmptyTopicList);
        }
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let mut results = Vec::with_capacity(topics.len());
        for topic in topics {
            results.push(self.publish_one(topic, message.as_bytes()).await);
        }
        Ok(results)
    }

    /// Publish a command decided by the automation controller
    pub(crate) async fn publish_command(&self, command: &OutboundCommand) -> PublishResult {
        if !self.is_connected() {
            let result = PublishResult {
                topic: command.topic.clone(),
                success: false,
            };
            self.observer.on_publish_result(&result);
            return result;
        }
        self.publish_one(&command.topic, command.payload.as_bytes())
            .await
    }

    async fn publish_one(&self, topic: &str, payload: &[u8]) -> PublishResult {
        let success = match self
            .transport
            .publish(topic, payload, QoS::AtMostOnce)
            .await
        {
            Ok(()) => {
                debug!(topic, bytes = payload.len(), "Publish handed to transport");
                true
            }
            Err(e) => {
                warn!(topic, "Publish failed: {}", e);
                false
            }
        };

        let result = PublishResult {
            topic: topic.to_string(),
            success,
        };
        self.observer.on_publish_result(&result);
        result
    }
}
