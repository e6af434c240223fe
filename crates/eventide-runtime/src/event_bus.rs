//! Event bus: fans committed events out to local handlers and publishers.
//!
//! For a single event, every local handler runs (in registration order)
//! before any publisher is attempted. Events registered as local-only never
//! reach a publisher. Side effects already performed are never undone by a
//! later failure.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::handler::{EventHandler, EventPublisher};
use eventide_core::registry::EventRegistry;

/// How an event is handed to the registered publishers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishMode {
    /// One publisher after another, stopping at the first failure.
    #[default]
    Sequential,
    /// All publishers at once; the first failure in registration order is
    /// reported.
    Concurrent,
}

impl FromStr for PublishMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(format!("unknown publish mode `{other}`")),
        }
    }
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Concurrent => f.write_str("concurrent"),
        }
    }
}

/// Routes committed events to local handlers and external publishers.
pub struct EventBus {
    registry: Arc<EventRegistry>,
    mode: PublishMode,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    publishers: RwLock<Vec<Arc<dyn EventPublisher>>>,
    closed: AtomicBool,
}

impl EventBus {
    /// Creates a bus with no handlers or publishers.
    #[must_use]
    pub fn new(registry: Arc<EventRegistry>, mode: PublishMode) -> Self {
        Self {
            registry,
            mode,
            handlers: RwLock::new(Vec::new()),
            publishers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Appends a local handler.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    /// Appends an external publisher.
    pub fn add_publisher(&self, publisher: Arc<dyn EventPublisher>) {
        tracing::debug!(publisher = publisher.name(), "publisher registered");
        self.publishers.write().push(publisher);
    }

    /// Returns the registry used to classify events.
    #[must_use]
    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Returns the publish mode.
    #[must_use]
    pub fn mode(&self) -> PublishMode {
        self.mode
    }

    /// Runs the local handlers, then forwards the event to the publishers
    /// unless its type is local-only.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` before any handler runs if the
    /// type is not registered, otherwise the first handler or publisher error.
    pub async fn publish_to_local(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        let is_local = self.registry.is_local(&event.event_type)?;
        self.run_handlers(ctx, event).await?;
        if is_local {
            tracing::debug!(event_type = %event.event_type, "local-only event kept in process");
            return Ok(());
        }
        self.publish_external(ctx, event).await
    }

    /// Runs only the local handlers. Used for events received from other
    /// services, which must not be forwarded again.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` for unregistered types or the
    /// first handler error.
    pub async fn deliver_local(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        if !self.registry.contains(&event.event_type) {
            return Err(DomainError::UnknownEventType(event.event_type.clone()));
        }
        self.run_handlers(ctx, event).await
    }

    async fn run_handlers(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        let handlers = self.handlers.read().clone();
        for handler in handlers {
            ctx.check()?;
            handler.handle_event(ctx, event).await?;
        }
        Ok(())
    }

    async fn publish_external(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        let publishers = self.publishers.read().clone();
        match self.mode {
            PublishMode::Sequential => {
                for publisher in publishers {
                    if let Err(err) = publisher.publish(ctx, event).await {
                        tracing::error!(
                            publisher = publisher.name(),
                            event_type = %event.event_type,
                            error = %err,
                            "publish failed"
                        );
                        return Err(err);
                    }
                }
                Ok(())
            }
            PublishMode::Concurrent => {
                let results = futures::future::join_all(
                    publishers.iter().map(|publisher| publisher.publish(ctx, event)),
                )
                .await;
                let mut first_error = None;
                for (publisher, result) in publishers.iter().zip(results) {
                    if let Err(err) = result {
                        tracing::error!(
                            publisher = publisher.name(),
                            event_type = %event.event_type,
                            error = %err,
                            "publish failed"
                        );
                        first_error.get_or_insert(err);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }

    /// Closes every publisher, even when one of them fails. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the first close error in registration order.
    pub async fn close(&self) -> Result<(), DomainError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let publishers = self.publishers.read().clone();
        let mut first_error = None;
        for publisher in publishers {
            if let Err(err) = publisher.close().await {
                tracing::warn!(publisher = publisher.name(), error = %err, "publisher close failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("mode", &self.mode)
            .field("handlers", &self.handlers.read().len())
            .field("publishers", &self.publishers.read().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventHandler for EventBus {
    async fn handle_event(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        self.publish_to_local(ctx, event).await
    }
}
