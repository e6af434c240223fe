//! Cloud Pub/Sub publisher speaking the REST API.
//!
//! Works against the hosted service with a caller-supplied bearer token and
//! against the local emulator without one. On connect the topic is looked
//! up and created when it does not exist yet.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::handler::EventPublisher;

use crate::config::PubSubConfig;
use crate::retry::connect_with_retry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct PublishRequest<'a> {
    messages: Vec<PubsubMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct PubsubMessage<'a> {
    data: String,
    attributes: BTreeMap<&'static str, &'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

fn publish_request(event: &Event) -> Result<PublishRequest<'_>, DomainError> {
    let envelope = event.to_envelope()?;
    let attributes = BTreeMap::from([
        ("event_type", event.event_type.as_str()),
        ("aggregate_type", event.aggregate_type.as_str()),
        ("aggregate_id", event.aggregate_id.as_str()),
    ]);
    Ok(PublishRequest {
        messages: vec![PubsubMessage {
            data: STANDARD.encode(envelope),
            attributes,
        }],
    })
}

fn publish_error(context: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::Publish(format!("{context}: {err}"))
}

/// Publishes JSON event envelopes to one Pub/Sub topic.
pub struct PubSubPublisher {
    client: Client,
    config: PubSubConfig,
    closed: AtomicBool,
}

impl PubSubPublisher {
    /// Connects to the topic named in `config`, creating it if needed and
    /// retrying as configured.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Publish` if the HTTP client cannot be built and
    /// `DomainError::ConnectionExhausted` if the topic stays unreachable.
    pub async fn connect(config: PubSubConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| publish_error("could not build http client", err))?;
        let publisher = Self {
            client,
            config,
            closed: AtomicBool::new(false),
        };
        let url = publisher.config.topic_url();
        connect_with_retry(
            &url,
            publisher.config.max_attempts,
            publisher.config.backoff,
            || publisher.ensure_topic(),
        )
        .await?;
        tracing::info!(
            project_id = %publisher.config.project_id,
            topic = %publisher.config.topic,
            "pubsub publisher connected"
        );
        Ok(publisher)
    }

    /// Returns the settings in use.
    #[must_use]
    pub fn config(&self) -> &PubSubConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn ensure_topic(&self) -> Result<(), DomainError> {
        let url = self.config.topic_url();
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|err| publish_error("topic lookup failed", err))?;
        match response.status() {
            status if status.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => return Err(publish_error("topic lookup failed", status)),
        }

        tracing::info!(topic = %self.config.topic, "creating pubsub topic");
        let response = self
            .authorize(self.client.put(&url))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|err| publish_error("topic creation failed", err))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            // Another publisher created it first.
            StatusCode::CONFLICT => Ok(()),
            status => Err(publish_error("topic creation failed", status)),
        }
    }

    async fn send(&self, event: &Event) -> Result<PublishResponse, DomainError> {
        let body = publish_request(event)?;
        let url = format!("{}:publish", self.config.topic_url());
        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|err| publish_error("publish request failed", err))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DomainError::Publish(format!(
                "publish rejected ({status}): {detail}"
            )));
        }
        response
            .json()
            .await
            .map_err(|err| publish_error("unreadable publish response", err))
    }
}

#[async_trait]
impl EventPublisher for PubSubPublisher {
    async fn publish(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DomainError::Publish("pubsub publisher is closed".to_owned()));
        }
        let response = ctx.run(self.send(event)).await.inspect_err(|err| {
            tracing::error!(topic = %self.config.topic, error = %err, "could not publish event");
        })?;

        tracing::debug!(
            topic = %self.config.topic,
            message_ids = ?response.message_ids,
            event_type = %event.event_type,
            aggregate_type = %event.aggregate_type,
            aggregate_id = %event.aggregate_id,
            "event published via pubsub"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), DomainError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(topic = %self.config.topic, "closing pubsub publisher");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pubsub"
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn event() -> Event {
        Event {
            aggregate_id: "A1".into(),
            aggregate_type: "Order".into(),
            event_type: "OrderCreated".into(),
            version: 1,
            timestamp: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            data: json!({ "item": "widget" }),
        }
    }

    #[test]
    fn test_publish_request_carries_envelope_and_attributes() {
        let event = event();

        let request = publish_request(&event).unwrap();
        let body = serde_json::to_value(&request).unwrap();

        let message = &body["messages"][0];
        assert_eq!(message["attributes"]["event_type"], "OrderCreated");
        assert_eq!(message["attributes"]["aggregate_type"], "Order");
        assert_eq!(message["attributes"]["aggregate_id"], "A1");
        let data = STANDARD.decode(message["data"].as_str().unwrap()).unwrap();
        let decoded: Event = serde_json::from_slice(&data).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_publish_response_tolerates_missing_ids() {
        let response: PublishResponse = serde_json::from_str("{}").unwrap();
        assert!(response.message_ids.is_empty());

        let response: PublishResponse = serde_json::from_str(r#"{"messageIds":["7"]}"#).unwrap();
        assert_eq!(response.message_ids, vec!["7"]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_attempts() {
        let mut config = PubSubConfig::new("shop", "events");
        config.endpoint = "http://127.0.0.1:1".into();
        config.max_attempts = 2;
        config.backoff = Duration::from_millis(1);

        let result = PubSubPublisher::connect(config).await;

        assert!(matches!(
            result,
            Err(DomainError::ConnectionExhausted { attempts: 2, .. })
        ));
    }
}
