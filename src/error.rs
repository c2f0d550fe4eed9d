//! Error taxonomy for session operations
//!
//! Validation errors are returned to the caller synchronously. Transport and
//! payload errors surface through the session observer as an [`ErrorKind`]
//! plus message. None of them terminate the process.

use thiserror::Error;

/// Main error type for session operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("Invalid connection config: {message}")]
    InvalidConfig { message: String },

    #[error("Not connected - connect to a broker first")]
    NotConnected,

    #[error("Please provide at least one topic to publish to")]
    EmptyTopicList,

    #[error("Please provide a message to publish")]
    EmptyMessage,

    #[error("Please provide at least one topic to subscribe to")]
    EmptyFilter,

    #[error("Transport failure: {message}")]
    TransportFailure { message: String },

    #[error("Malformed moisture status payload: {message}")]
    MalformedPayload { message: String },

    #[error("Flood alert received - the broker is having problems, disconnecting all clients")]
    EmergencyDisconnect,
}

impl SessionError {
    /// Observer-facing classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            SessionError::NotConnected => ErrorKind::NotConnected,
            SessionError::EmptyTopicList => ErrorKind::EmptyTopicList,
            SessionError::EmptyMessage => ErrorKind::EmptyMessage,
            SessionError::EmptyFilter => ErrorKind::EmptyFilter,
            SessionError::TransportFailure { .. } => ErrorKind::TransportFailure,
            SessionError::MalformedPayload { .. } => ErrorKind::MalformedPayload,
            SessionError::EmergencyDisconnect => ErrorKind::EmergencyDisconnect,
        }
    }

    /// Create invalid config error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create transport failure error
    pub fn transport_failure<S: Into<String>>(message: S) -> Self {
        Self::TransportFailure {
            message: message.into(),
        }
    }

    /// Create malformed payload error
    pub fn malformed_payload<S: Into<String>>(message: S) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }
}

/// Error classes reported through `SessionObserver::on_error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidConfig,
    NotConnected,
    EmptyTopicList,
    EmptyMessage,
    EmptyFilter,
    TransportFailure,
    MalformedPayload,
    EmergencyDisconnect,
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let error = SessionError::invalid_config("port out of range");
        assert!(matches!(error, SessionError::InvalidConfig { .. }));
        assert_eq!(
            error.to_string(),
            "Invalid connection config: port out of range"
        );

        let error = SessionError::transport_failure("connection refused");
        assert_eq!(error.to_string(), "Transport failure: connection refused");

        let error = SessionError::malformed_payload("missing field");
        assert_eq!(
            error.to_string(),
            "Malformed moisture status payload: missing field"
        );
    }

    #[test]
    fn test_every_variant_maps_to_its_kind() {
        let cases = vec![
            (SessionError::invalid_config("x"), ErrorKind::InvalidConfig),
            (SessionError::NotConnected, ErrorKind::NotConnected),
            (SessionError::EmptyTopicList, ErrorKind::EmptyTopicList),
            (SessionError::EmptyMessage, ErrorKind::EmptyMessage),
            (SessionError::EmptyFilter, ErrorKind::EmptyFilter),
            (
                SessionError::transport_failure("x"),
                ErrorKind::TransportFailure,
            ),
            (
                SessionError::malformed_payload("x"),
                ErrorKind::MalformedPayload,
            ),
            (
                SessionError::EmergencyDisconnect,
                ErrorKind::EmergencyDisconnect,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "wrong kind for {error}");
            assert!(!error.to_string().is_empty());
        }
    }
}
