//! Event consumers: local handlers and external publishers.

use async_trait::async_trait;

use crate::context::Context;
use crate::error::DomainError;
use crate::event::Event;

/// In-process consumer of committed events (projections, saga adapters).
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one committed event.
    ///
    /// # Errors
    ///
    /// Returns an error to stop delivery of this event to later handlers.
    async fn handle_event(&self, ctx: &Context, event: &Event) -> Result<(), DomainError>;
}

/// External fan-out sink for events that may leave the process.
///
/// Publishing is best-effort: implementations make one attempt per call and
/// never retry internally.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Publish` on transport failure or after `close`.
    async fn publish(&self, ctx: &Context, event: &Event) -> Result<(), DomainError>;

    /// Releases the underlying connection. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Publish` if pending messages could not be flushed.
    async fn close(&self) -> Result<(), DomainError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
