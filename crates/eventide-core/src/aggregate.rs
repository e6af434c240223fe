//! Aggregate root abstraction.
//!
//! An aggregate's visible state is a pure function of the events applied to
//! it. Domain types embed an [`AggregateRoot`] for identity, version and the
//! uncommitted buffer, and implement [`Aggregate`] for the two domain hooks:
//! applying an event and handling a command.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::context::Context;
use crate::error::DomainError;
use crate::event::{Event, EventPayload};

/// Identity, version and pending events shared by every aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRoot {
    id: String,
    type_name: String,
    version: i64,
    #[serde(skip)]
    uncommitted_events: Vec<Event>,
}

impl AggregateRoot {
    /// Creates a root at version 0 with no pending events.
    #[must_use]
    pub fn new(id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            version: 0,
            uncommitted_events: Vec::new(),
        }
    }

    /// Returns the aggregate identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the aggregate type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the current version (number of events applied).
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Advances the version by one, after an event has been applied.
    pub(crate) fn increment_version(&mut self) {
        self.version += 1;
    }

    /// Returns the next version number for a new event.
    #[allow(clippy::cast_possible_wrap)]
    fn next_version(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64 + 1
    }

    /// Records a new event produced by command handling.
    ///
    /// The event is stamped with the next free version and the context
    /// clock's time. It only becomes part of the aggregate's state once it
    /// has been persisted and re-applied.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    pub fn record<T: EventPayload>(&mut self, ctx: &Context, payload: &T) -> Result<(), DomainError> {
        let event = Event {
            aggregate_id: self.id.clone(),
            aggregate_type: self.type_name.clone(),
            event_type: T::EVENT_TYPE.to_owned(),
            version: self.next_version(),
            timestamp: ctx.now(),
            data: serde_json::to_value(payload)?,
        };
        self.uncommitted_events.push(event);
        Ok(())
    }

    /// Returns uncommitted events produced by command handling.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[Event] {
        &self.uncommitted_events
    }

    /// Removes and returns the uncommitted events.
    pub fn take_uncommitted_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.uncommitted_events)
    }

    /// Clears uncommitted events after persistence or a failed command.
    pub fn clear_uncommitted_events(&mut self) {
        self.uncommitted_events.clear();
    }
}

/// Trait for aggregate roots that reconstitute from event history.
///
/// Aggregates are serializable so they can be captured as snapshots; the
/// embedded root never serializes its uncommitted events.
#[async_trait]
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the embedded root.
    fn root(&self) -> &AggregateRoot;

    /// Returns the embedded root mutably.
    fn root_mut(&mut self) -> &mut AggregateRoot;

    /// Apply an event to mutate internal state. Must not touch the version.
    ///
    /// # Errors
    ///
    /// Returns a domain error when the event cannot be applied; replay stops
    /// at the first failure.
    fn apply_event(&mut self, event: &Event) -> Result<(), DomainError>;

    /// Handle a command, recording new events through [`AggregateRoot::record`].
    ///
    /// # Errors
    ///
    /// Returns a domain error when the command is rejected; any events
    /// recorded before the failure are discarded by the caller.
    async fn handle_command(&mut self, ctx: &Context, command: &dyn Command)
    -> Result<(), DomainError>;

    /// Returns the aggregate identifier.
    fn id(&self) -> &str {
        self.root().id()
    }

    /// Returns the aggregate type name.
    fn type_name(&self) -> &str {
        self.root().type_name()
    }

    /// Returns the current version.
    fn version(&self) -> i64 {
        self.root().version()
    }
}

/// Applies one committed event and advances the version past it.
///
/// This is the only way an aggregate's version moves forward; replay and
/// the post-commit re-apply both go through here.
///
/// # Errors
///
/// Returns `DomainError::MismatchedEventType` when the event belongs to
/// another aggregate type and `DomainError::ApplyEvent` when the aggregate
/// refuses it. The version is left untouched on failure.
pub fn apply_committed<A: Aggregate>(aggregate: &mut A, event: &Event) -> Result<(), DomainError> {
    if event.aggregate_type != aggregate.type_name() {
        return Err(DomainError::MismatchedEventType {
            expected: aggregate.type_name().to_owned(),
            found: event.aggregate_type.clone(),
        });
    }
    aggregate
        .apply_event(event)
        .map_err(|source| DomainError::ApplyEvent {
            event: Box::new(event.clone()),
            source: Box::new(source),
        })?;
    aggregate.root_mut().increment_version();
    Ok(())
}
