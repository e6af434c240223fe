//! Test event handlers — mock `EventHandler` implementations for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::handler::EventHandler;

/// An event handler that records every event it receives.
///
/// Clones share the same log, so a test can keep one clone and hand the
/// other to the event bus.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventHandler {
    received: Arc<Mutex<Vec<Event>>>,
}

impl RecordingEventHandler {
    /// Create an empty recording handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events received so far, in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.received.lock().unwrap().clone()
    }

    /// Returns the event types received so far, in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle_event(&self, _ctx: &Context, event: &Event) -> Result<(), DomainError> {
        self.received.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// An event handler that always fails with a validation error.
#[derive(Debug)]
pub struct FailingEventHandler;

#[async_trait]
impl EventHandler for FailingEventHandler {
    async fn handle_event(&self, _ctx: &Context, event: &Event) -> Result<(), DomainError> {
        Err(DomainError::Validation(format!(
            "handler rejected {}",
            event.event_type
        )))
    }
}
