//! Configuration for the soilwatch session
//!
//! Two layers live here: [`ConnectionConfig`], the validated value handed to
//! `Session::connect`, and [`AppConfig`], the TOML file the CLI loads.
//! Broker credentials are never stored in the file; the file names the
//! environment variables that hold them.

use crate::automation::Thresholds;
use crate::error::{SessionError, SessionResult};
use crate::protocol::{parse_filter_list, TopicError, TopicFilter, TopicScheme};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Broker connection parameters for one connection attempt
///
/// `port` is wider than `u16` so out-of-range input can be rejected with
/// `InvalidConfig` instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u32,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u32, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Reject empty host, out-of-range port and empty client id
    pub fn validate(&self) -> SessionResult<()> {
        if self.host.trim().is_empty() {
            return Err(SessionError::invalid_config("host cannot be empty"));
        }
        if !(1..=u32::from(u16::MAX)).contains(&self.port) {
            return Err(SessionError::invalid_config(format!(
                "port {} is outside 1-65535",
                self.port
            )));
        }
        if self.client_id.trim().is_empty() {
            return Err(SessionError::invalid_config("client id cannot be empty"));
        }
        Ok(())
    }

    /// Port as `u16`; only meaningful after [`validate`](Self::validate)
    pub fn port_u16(&self) -> u16 {
        u16::try_from(self.port).unwrap_or(u16::MAX)
    }

    /// Credentials when both username and password are non-empty
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

/// Top-level configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub broker: BrokerSection,
    pub session: SessionSection,
    pub topics: TopicsSection,
    #[serde(default)]
    pub automation: AutomationSection,
}

/// Broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker host name or address
    pub host: String,
    /// Broker port (default: 1883)
    #[serde(default = "default_port")]
    pub port: u32,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    /// MQTT keep-alive in seconds (default: 60)
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

fn default_port() -> u32 {
    1883
}

fn default_keep_alive() -> u64 {
    60
}

/// Session identity section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Human-chosen client name, combined with the prefix into the client id
    pub client_name: String,
    #[serde(default = "default_client_prefix")]
    pub client_prefix: String,
}

fn default_client_prefix() -> String {
    "soilwatch-center".to_string()
}

/// Topic section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    /// Client-scope token embedded in topic names
    pub scope: String,
    /// User filters subscribed after the default `public/#`
    #[serde(default)]
    pub subscribe: Vec<String>,
}

/// Automation section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutomationSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Readings strictly below this turn watering on
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    /// Readings strictly above this turn watering off
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
}

fn default_enabled() -> bool {
    true
}

fn default_low_threshold() -> f64 {
    20.0
}

fn default_high_threshold() -> f64 {
    30.0
}

impl Default for AutomationSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid topic scope: {0}")]
    InvalidScope(#[from] TopicError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        TopicScheme::new(&self.topics.scope)?;

        if self.session.client_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "session.client_name cannot be empty".to_string(),
            ));
        }

        Thresholds::new(
            self.automation.low_threshold,
            self.automation.high_threshold,
        )
        .map_err(|e| ConfigError::InvalidConfig(format!("automation: {e}")))?;

        if self.broker.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.keep_alive_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Client id sent to the broker: `<prefix>-<client_name>`
    pub fn client_id(&self) -> String {
        format!(
            "{}-{}",
            self.session.client_prefix,
            self.session.client_name.trim()
        )
    }

    /// Build the connection config, resolving credentials from the environment
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.broker.host.clone(),
            port: self.broker.port,
            client_id: self.client_id(),
            username: Self::get_env_var_optional(self.broker.username_env.as_ref()),
            password: Self::get_env_var_optional(self.broker.password_env.as_ref()),
        }
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.broker.keep_alive_secs)
    }

    pub fn topic_scheme(&self) -> Result<TopicScheme, ConfigError> {
        Ok(TopicScheme::new(&self.topics.scope)?)
    }

    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        Thresholds::new(
            self.automation.low_threshold,
            self.automation.high_threshold,
        )
        .map_err(|e| ConfigError::InvalidConfig(format!("automation: {e}")))
    }

    /// Configured user filters, each entry allowed to hold a comma list
    pub fn subscribe_filters(&self) -> Vec<TopicFilter> {
        self.topics
            .subscribe
            .iter()
            .flat_map(|entry| parse_filter_list(entry))
            .collect()
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_connection() -> ConnectionConfig {
        ConnectionConfig::new("broker.local", 1883, "soilwatch-center-bench")
    }

    #[test]
    fn test_valid_connection_config() {
        assert!(valid_connection().validate().is_ok());
        assert_eq!(valid_connection().port_u16(), 1883);
    }

    #[test]
    fn test_connection_config_rejections() {
        let mut config = valid_connection();
        config.host = String::new();
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidConfig { .. })
        ));

        for port in [0, 65536, 70000] {
            let mut config = valid_connection();
            config.port = port;
            assert!(
                matches!(config.validate(), Err(SessionError::InvalidConfig { .. })),
                "port {port} should be rejected"
            );
        }

        let mut config = valid_connection();
        config.client_id = "   ".to_string();
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_port_bounds_accepted() {
        for port in [1, 65535] {
            let mut config = valid_connection();
            config.port = port;
            assert!(config.validate().is_ok(), "port {port} should be accepted");
        }
    }

    #[test]
    fn test_credentials_require_both_parts() {
        assert_eq!(valid_connection().credentials(), None);
        assert_eq!(
            valid_connection()
                .with_credentials("user", "pass")
                .credentials(),
            Some(("user", "pass"))
        );
        assert_eq!(
            valid_connection().with_credentials("user", "").credentials(),
            None
        );
        assert_eq!(
            valid_connection().with_credentials("", "pass").credentials(),
            None
        );
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[broker]
host = "rule28.example.org"
port = 1884
username_env = "SOILWATCH_USER"
password_env = "SOILWATCH_PASS"
keep_alive_secs = 30

[session]
client_name = "bench"
client_prefix = "greenhouse"

[topics]
scope = "site-42"
subscribe = ["public/site-42/#, public/weather/#", "alerts/#"]

[automation]
enabled = false
low_threshold = 15.0
high_threshold = 35.0
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.broker.port, 1884);
        assert_eq!(config.client_id(), "greenhouse-bench");
        assert_eq!(config.keep_alive(), Duration::from_secs(30));
        assert!(!config.automation.enabled);

        let patterns: Vec<String> = config
            .subscribe_filters()
            .into_iter()
            .map(|f| f.pattern)
            .collect();
        assert_eq!(
            patterns,
            vec!["public/site-42/#", "public/weather/#", "alerts/#"]
        );
    }

    #[test]
    fn test_minimal_config_defaults() {
        let toml_content = r#"
[broker]
host = "localhost"

[session]
client_name = "bench"

[topics]
scope = "site-42"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.keep_alive_secs, 60);
        assert_eq!(config.client_id(), "soilwatch-center-bench");
        assert!(config.automation.enabled);
        assert_eq!(config.automation.low_threshold, 20.0);
        assert_eq!(config.automation.high_threshold, 30.0);
        assert!(config.subscribe_filters().is_empty());
    }

    #[test]
    fn test_invalid_scope_rejected() {
        let toml_content = r#"
[broker]
host = "localhost"

[session]
client_name = "bench"

[topics]
scope = "site/42"
"#;

        let result = AppConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidScope(_))));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let toml_content = r#"
[broker]
host = "localhost"

[session]
client_name = "bench"

[topics]
scope = "site-42"

[automation]
low_threshold = 40.0
high_threshold = 30.0
"#;

        let result = AppConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }
}
