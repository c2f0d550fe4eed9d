//! Pure connection configuration for the MQTT transport
//!
//! This module contains pure functions that translate session-level types
//! into rumqttc options and back.

use crate::config::ConnectionConfig;
use crate::protocol::QoS;
use rumqttc::{ConnectReturnCode, MqttOptions, QoS as MqttQoS};
use std::time::Duration;
use thiserror::Error;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Not connected to a broker")]
    NotConnected,
    #[error("Invalid client id: {0:?}")]
    InvalidClientId(String),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Pure function to configure MQTT options from a validated connection config
pub fn configure_mqtt_options(
    config: &ConnectionConfig,
    keep_alive: Duration,
) -> Result<MqttOptions, MqttError> {
    // rumqttc panics on these ids instead of returning an error
    if config.client_id.is_empty() || config.client_id.starts_with(' ') {
        return Err(MqttError::InvalidClientId(config.client_id.clone()));
    }

    let mut mqtt_options =
        MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port_u16());
    mqtt_options.set_keep_alive(keep_alive);
    mqtt_options.set_clean_session(true);

    if let Some((username, password)) = config.credentials() {
        mqtt_options.set_credentials(username, password);
    }

    Ok(mqtt_options)
}

/// Map session QoS onto rumqttc QoS
pub fn to_mqtt_qos(qos: QoS) -> MqttQoS {
    match qos {
        QoS::AtMostOnce => MqttQoS::AtMostOnce,
        QoS::AtLeastOnce => MqttQoS::AtLeastOnce,
        QoS::ExactlyOnce => MqttQoS::ExactlyOnce,
    }
}

/// Numeric CONNACK return code as defined by MQTT 3.1.1
pub fn connect_return_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection_config() -> ConnectionConfig {
        ConnectionConfig::new("localhost", 1883, "soilwatch-center-test")
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&test_connection_config(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.client_id(), "soilwatch-center-test");
        assert_eq!(options.keep_alive(), Duration::from_secs(60));
        assert_eq!(options.credentials(), None);
    }

    #[test]
    fn test_credentials_applied_when_complete() {
        let config = test_connection_config().with_credentials("user", "secret");
        let options = configure_mqtt_options(&config, Duration::from_secs(60)).unwrap();
        assert_eq!(
            options.credentials(),
            Some(("user".to_string(), "secret".to_string()))
        );

        let config = test_connection_config().with_credentials("user", "");
        let options = configure_mqtt_options(&config, Duration::from_secs(60)).unwrap();
        assert_eq!(options.credentials(), None);
    }

    #[test]
    fn test_leading_space_client_id_rejected() {
        let mut config = test_connection_config();
        config.client_id = " padded".to_string();
        let result = configure_mqtt_options(&config, Duration::from_secs(60));
        assert!(matches!(result, Err(MqttError::InvalidClientId(_))));
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(to_mqtt_qos(QoS::AtMostOnce), MqttQoS::AtMostOnce);
        assert_eq!(to_mqtt_qos(QoS::AtLeastOnce), MqttQoS::AtLeastOnce);
        assert_eq!(to_mqtt_qos(QoS::ExactlyOnce), MqttQoS::ExactlyOnce);
    }

    #[test]
    fn test_return_codes() {
        assert_eq!(connect_return_code(ConnectReturnCode::Success), 0);
        assert_eq!(connect_return_code(ConnectReturnCode::NotAuthorized), 5);
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::NotConnected,
            MqttError::InvalidClientId(" x".to_string()),
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::SubscriptionFailed("test".to_string().into()),
            MqttError::DisconnectFailed("test".to_string().into()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
