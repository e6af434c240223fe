//! NATS publisher.

use async_trait::async_trait;
use parking_lot::Mutex;

use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::handler::EventPublisher;

use crate::config::NatsConfig;
use crate::retry::connect_with_retry;

const CLIENT_NAME: &str = "eventide-publisher";

/// Subject an event of `event_type` is published on.
#[must_use]
pub fn subject(namespace: &str, event_type: &str) -> String {
    format!("{namespace}.{event_type}")
}

/// Publishes JSON event envelopes to `<namespace>.<event_type>`.
pub struct NatsPublisher {
    namespace: String,
    client: Mutex<Option<async_nats::Client>>,
}

impl NatsPublisher {
    /// Connects to the server named in `config`, retrying as configured.
    /// The client reconnects on its own once connected.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConnectionExhausted` if no attempt succeeds.
    pub async fn connect(config: &NatsConfig) -> Result<Self, DomainError> {
        let uri = config.uri.as_str();
        let client = connect_with_retry(uri, config.max_attempts, config.backoff, || {
            async_nats::ConnectOptions::new()
                .name(CLIENT_NAME)
                .max_reconnects(None::<usize>)
                .event_callback(|event| async move {
                    tracing::debug!(%event, "nats connection event");
                })
                .connect(uri)
        })
        .await?;
        tracing::info!(uri, namespace = %config.namespace, "nats publisher connected");
        Ok(Self::from_client(client, config.namespace.clone()))
    }

    /// Wraps an already connected client.
    #[must_use]
    pub fn from_client(client: async_nats::Client, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            client: Mutex::new(Some(client)),
        }
    }

    /// Returns the subject prefix.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn client(&self) -> Result<async_nats::Client, DomainError> {
        self.client
            .lock()
            .clone()
            .ok_or_else(|| DomainError::Publish("nats publisher is closed".to_owned()))
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        let client = self.client()?;
        let subject = subject(&self.namespace, &event.event_type);
        let payload = event.to_envelope()?;

        ctx.run(async {
            client
                .publish(subject.clone(), payload.into())
                .await
                .map_err(|err| {
                    tracing::error!(subject = %subject, error = %err, "could not publish event");
                    DomainError::Publish(err.to_string())
                })
        })
        .await?;

        tracing::debug!(
            subject = %subject,
            event_type = %event.event_type,
            aggregate_type = %event.aggregate_type,
            aggregate_id = %event.aggregate_id,
            "event published via nats"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), DomainError> {
        let client = self.client.lock().take();
        let Some(client) = client else {
            return Ok(());
        };
        tracing::debug!(namespace = %self.namespace, "closing nats connection");
        client
            .flush()
            .await
            .map_err(|err| DomainError::Publish(format!("nats flush failed: {err}")))
    }

    fn name(&self) -> &'static str {
        "nats"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_subject_joins_namespace_and_event_type() {
        assert_eq!(subject("orders", "OrderCreated"), "orders.OrderCreated");
    }

    #[tokio::test]
    async fn test_unreachable_server_exhausts_attempts() {
        let mut config = NatsConfig::new("nats://127.0.0.1:1", "orders");
        config.max_attempts = 2;
        config.backoff = Duration::from_millis(1);

        let result = NatsPublisher::connect(&config).await;

        assert!(matches!(
            result,
            Err(DomainError::ConnectionExhausted { attempts: 2, .. })
        ));
    }
}
