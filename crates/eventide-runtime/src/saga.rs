//! Sagas: event handlers that answer events with follow-up commands.
//!
//! Commands produced for one event are dispatched in order. The first failed
//! dispatch aborts the rest, so a saga can leave earlier commands applied and
//! later ones never sent. Nothing is retried.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use eventide_core::command::Command;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::handler::EventHandler;

use crate::command_bus::CommandBus;
use crate::matcher::EventMatcher;

/// Turns a matching event into the commands that should follow it.
#[async_trait]
pub trait Saga: Send + Sync {
    /// Produces the follow-up commands for `event`, in dispatch order.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be interpreted.
    async fn run(&self, ctx: &Context, event: &Event) -> Result<Vec<Box<dyn Command>>, DomainError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Adapts a [`Saga`] to the event bus.
pub struct SagaHandler {
    saga: Arc<dyn Saga>,
    matcher: EventMatcher,
    bus: Weak<CommandBus>,
}

impl SagaHandler {
    /// Creates a handler that runs `saga` for events accepted by `matcher`
    /// and dispatches on `bus`.
    #[must_use]
    pub fn new(saga: Arc<dyn Saga>, matcher: EventMatcher, bus: &Arc<CommandBus>) -> Self {
        Self {
            saga,
            matcher,
            bus: Arc::downgrade(bus),
        }
    }
}

#[async_trait]
impl EventHandler for SagaHandler {
    async fn handle_event(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        if !self.matcher.matches(event) {
            return Ok(());
        }
        let commands = self.saga.run(ctx, event).await?;
        if commands.is_empty() {
            return Ok(());
        }
        let bus = self.bus.upgrade().ok_or(DomainError::BusClosed)?;

        let total = commands.len();
        for (submitted, command) in commands.iter().enumerate() {
            if let Err(err) = bus.dispatch(ctx, command.as_ref()).await {
                tracing::warn!(
                    saga = self.saga.name(),
                    event_type = %event.event_type,
                    command = command.command_type(),
                    submitted,
                    total,
                    error = %err,
                    "saga dispatch failed, remaining commands dropped"
                );
                return Err(err);
            }
        }
        tracing::debug!(saga = self.saga.name(), dispatched = total, "saga completed");
        Ok(())
    }
}
