//! Topic naming and user input parsing
//!
//! Topics embed an opaque client-scope token, e.g.
//! `public/<scope>/soil moisture/status`. The scope is configuration, so the
//! same binary serves any installation.

use super::messages::TopicFilter;
use thiserror::Error;

/// Global filter subscribed before any user filter
pub const DEFAULT_FILTER: &str = "public/#";

/// Topic layout for one installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    scope: String,
}

impl TopicScheme {
    pub fn new(scope: impl Into<String>) -> Result<Self, TopicError> {
        let scope = scope.into();
        validate_scope(&scope)?;
        Ok(Self { scope })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// `public/<scope>/soil moisture/status`
    pub fn status_topic(&self) -> String {
        format!("public/{}/soil moisture/status", self.scope)
    }

    /// `public/<scope>/soil moisture/control`
    pub fn control_topic(&self) -> String {
        format!("public/{}/soil moisture/control", self.scope)
    }

    /// `public/<scope>/#`, the usual user filter for an installation
    pub fn scope_filter(&self) -> String {
        format!("public/{}/#", self.scope)
    }
}

/// The always-present `public/#` filter at QoS 0
pub fn default_filter() -> TopicFilter {
    TopicFilter::at_most_once(DEFAULT_FILTER)
}

/// Split comma-separated user input into topics
///
/// Segments are trimmed and empty segments dropped, so `"a, b"`, `"a,b"` and
/// `"a,,b,"` all yield `["a", "b"]`. Publish and subscribe share this policy.
pub fn parse_topic_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse comma-separated user input into QoS 0 filters
pub fn parse_filter_list(input: &str) -> Vec<TopicFilter> {
    parse_topic_list(input)
        .into_iter()
        .map(TopicFilter::at_most_once)
        .collect()
}

fn validate_scope(scope: &str) -> Result<(), TopicError> {
    if scope.is_empty() {
        return Err(TopicError::EmptyScope);
    }

    if let Some(ch) = scope.chars().find(|c| matches!(c, '/' | '+' | '#' | '\0')) {
        return Err(TopicError::InvalidScopeChar(ch));
    }

    Ok(())
}

/// Topic scheme validation errors
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("client scope cannot be empty")]
    EmptyScope,
    #[error("client scope contains reserved character: '{0}'")]
    InvalidScopeChar(char),
}
