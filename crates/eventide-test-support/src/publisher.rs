//! Test publishers — mock `EventPublisher` implementations for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::handler::EventPublisher;

/// A publisher that records all published events and `close` calls.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<Event>>>,
    closes: Arc<AtomicUsize>,
}

impl RecordingPublisher {
    /// Create an empty recording publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn published(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }

    /// Returns how many times `close` was called.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, ctx: &Context, event: &Event) -> Result<(), DomainError> {
        ctx.check()?;
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), DomainError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// A publisher whose `publish` and `close` always fail with a transport
/// error. Counts publish attempts so tests can assert it was reached.
#[derive(Debug, Clone, Default)]
pub struct FailingPublisher {
    attempts: Arc<AtomicUsize>,
}

impl FailingPublisher {
    /// Create a failing publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many publish attempts were made.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _ctx: &Context, _event: &Event) -> Result<(), DomainError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::Publish("broker unavailable".into()))
    }

    async fn close(&self) -> Result<(), DomainError> {
        Err(DomainError::Publish("broker unavailable".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}
