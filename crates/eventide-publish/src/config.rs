//! Publisher settings read from the environment.

use std::time::Duration;

use thiserror::Error;

use crate::retry::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};

pub const NATS_URL_VAR: &str = "EVENTIDE_NATS_URL";
pub const NATS_NAMESPACE_VAR: &str = "EVENTIDE_NATS_NAMESPACE";
pub const PUBSUB_PROJECT_VAR: &str = "EVENTIDE_PUBSUB_PROJECT";
pub const PUBSUB_TOPIC_VAR: &str = "EVENTIDE_PUBSUB_TOPIC";
pub const PUBSUB_ENDPOINT_VAR: &str = "EVENTIDE_PUBSUB_ENDPOINT";
pub const PUBSUB_TOKEN_VAR: &str = "EVENTIDE_PUBSUB_TOKEN";

/// Public Pub/Sub REST endpoint.
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Errors raised while reading publisher settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublisherConfigError {
    /// A required variable is not set or is blank.
    #[error("{0} must be set")]
    Missing(&'static str),
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, PublisherConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(PublisherConfigError::Missing(key))
}

/// Settings for [`crate::NatsPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NatsConfig {
    /// Server address, e.g. `nats://localhost:4222`.
    pub uri: String,
    /// Subject prefix; events go to `<namespace>.<event_type>`.
    pub namespace: String,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl NatsConfig {
    #[must_use]
    pub fn new(uri: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            namespace: namespace.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Reads `EVENTIDE_NATS_URL` and `EVENTIDE_NATS_NAMESPACE`.
    ///
    /// # Errors
    ///
    /// Returns `PublisherConfigError::Missing` if either is unset.
    pub fn from_env() -> Result<Self, PublisherConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `PublisherConfigError::Missing` if a required key is absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PublisherConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self::new(
            required(&lookup, NATS_URL_VAR)?,
            required(&lookup, NATS_NAMESPACE_VAR)?,
        ))
    }
}

/// Settings for [`crate::PubSubPublisher`].
#[derive(Clone, PartialEq, Eq)]
pub struct PubSubConfig {
    /// REST base URL; point it at the emulator for local runs.
    pub endpoint: String,
    pub project_id: String,
    pub topic: String,
    /// Bearer token sent with every request. The emulator needs none.
    pub access_token: Option<String>,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl PubSubConfig {
    #[must_use]
    pub fn new(project_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_PUBSUB_ENDPOINT.to_owned(),
            project_id: project_id.into(),
            topic: topic.into(),
            access_token: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Reads `EVENTIDE_PUBSUB_PROJECT`, `EVENTIDE_PUBSUB_TOPIC` and the
    /// optional `EVENTIDE_PUBSUB_ENDPOINT` and `EVENTIDE_PUBSUB_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns `PublisherConfigError::Missing` if project or topic is unset.
    pub fn from_env() -> Result<Self, PublisherConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `PublisherConfigError::Missing` if a required key is absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PublisherConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(
            required(&lookup, PUBSUB_PROJECT_VAR)?,
            required(&lookup, PUBSUB_TOPIC_VAR)?,
        );
        if let Ok(endpoint) = required(&lookup, PUBSUB_ENDPOINT_VAR) {
            config.endpoint = endpoint.trim_end_matches('/').to_owned();
        }
        config.access_token = required(&lookup, PUBSUB_TOKEN_VAR).ok();
        Ok(config)
    }

    pub(crate) fn topic_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/topics/{}",
            self.endpoint, self.project_id, self.topic
        )
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for PubSubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubConfig")
            .field("endpoint", &self.endpoint)
            .field("project_id", &self.project_id)
            .field("topic", &self.topic)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_nats_config_reads_uri_and_namespace() {
        let config = NatsConfig::from_lookup(lookup(&[
            (NATS_URL_VAR, "nats://localhost:4222"),
            (NATS_NAMESPACE_VAR, "orders"),
        ]))
        .unwrap();

        assert_eq!(config.uri, "nats://localhost:4222");
        assert_eq!(config.namespace, "orders");
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff, Duration::from_secs(3));
    }

    #[test]
    fn test_nats_config_requires_namespace() {
        let err = NatsConfig::from_lookup(lookup(&[(NATS_URL_VAR, "nats://localhost:4222")])).unwrap_err();

        assert_eq!(err, PublisherConfigError::Missing(NATS_NAMESPACE_VAR));
    }

    #[test]
    fn test_pubsub_config_defaults_to_public_endpoint() {
        let config = PubSubConfig::from_lookup(lookup(&[
            (PUBSUB_PROJECT_VAR, "shop"),
            (PUBSUB_TOPIC_VAR, "events"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint, DEFAULT_PUBSUB_ENDPOINT);
        assert_eq!(config.access_token, None);
        assert_eq!(
            config.topic_url(),
            "https://pubsub.googleapis.com/v1/projects/shop/topics/events"
        );
    }

    #[test]
    fn test_pubsub_config_reads_emulator_endpoint_and_token() {
        let config = PubSubConfig::from_lookup(lookup(&[
            (PUBSUB_PROJECT_VAR, "shop"),
            (PUBSUB_TOPIC_VAR, "events"),
            (PUBSUB_ENDPOINT_VAR, "http://localhost:8085/"),
            (PUBSUB_TOKEN_VAR, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint, "http://localhost:8085");
        assert_eq!(config.access_token.as_deref(), Some("secret"));
        assert!(!format!("{config:?}").contains("secret"));
    }

    #[test]
    fn test_blank_project_is_missing() {
        let err = PubSubConfig::from_lookup(lookup(&[
            (PUBSUB_PROJECT_VAR, "  "),
            (PUBSUB_TOPIC_VAR, "events"),
        ]))
        .unwrap_err();

        assert_eq!(err, PublisherConfigError::Missing(PUBSUB_PROJECT_VAR));
    }
}
