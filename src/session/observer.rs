//! Presentation boundary of the session
//!
//! Everything a front end may want to show is pushed through
//! [`SessionObserver`]. The session never renders text itself.

use crate::error::ErrorKind;
use crate::protocol::{PublishResult, TopicFilter};
use crate::session::ConnectionState;
use tracing::{error, info, warn};

/// Receives session notifications
///
/// Callbacks run on the task that caused them: the foreground for
/// connect/publish/subscribe, the dispatch loop for inbound traffic.
/// Implementations must return quickly.
pub trait SessionObserver: Send + Sync {
    fn on_state_change(&self, state: &ConnectionState);

    /// One line per inbound message, formatted as `topic: payload(retained)`
    fn on_message_received(&self, line: &str);

    fn on_publish_result(&self, result: &PublishResult);

    fn on_subscribe_confirmed(&self, filters: &[TopicFilter]);

    fn on_warning(&self, message: &str);

    fn on_error(&self, kind: ErrorKind, message: &str);
}

/// Observer that writes every notification to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_state_change(&self, state: &ConnectionState) {
        info!(target: "soilwatch::session", state = %state, "Connection state changed");
    }

    fn on_message_received(&self, line: &str) {
        info!(target: "soilwatch::session", "{}", line);
    }

    fn on_publish_result(&self, result: &PublishResult) {
        if result.success {
            info!(target: "soilwatch::session", topic = %result.topic, "Message published");
        } else {
            warn!(target: "soilwatch::session", topic = %result.topic, "Message could not be published");
        }
    }

    fn on_subscribe_confirmed(&self, filters: &[TopicFilter]) {
        let listed: Vec<String> = filters.iter().map(ToString::to_string).collect();
        info!(target: "soilwatch::session", "Subscribed to {}", listed.join(", "));
    }

    fn on_warning(&self, message: &str) {
        warn!(target: "soilwatch::session", "{}", message);
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        error!(target: "soilwatch::session", ?kind, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_tracing_observer_logs_notifications() {
        let buffer = SharedBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let observer = TracingObserver;
            observer.on_state_change(&ConnectionState::Connected);
            observer.on_message_received("public/X/a: hello(false)");
            observer.on_subscribe_confirmed(&[TopicFilter::at_most_once("public/#")]);
            observer.on_publish_result(&PublishResult {
                topic: "public/X/b".to_string(),
                success: false,
            });
            observer.on_error(ErrorKind::NotConnected, "not connected");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Connection state changed"));
        assert!(output.contains("public/X/a: hello(false)"));
        assert!(output.contains("Subscribed to (public/#, 0)"));
        assert!(output.contains("WARN"));
        assert!(output.contains("could not be published"));
        assert!(output.contains("ERROR"));
    }
}
