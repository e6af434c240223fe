//! Domain error types.

use thiserror::Error;

use crate::event::Event;

/// Top-level error type shared by every Eventide crate.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An event type name is not present in the event registry.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// An event type name was registered twice.
    #[error("event type {0} is already registered")]
    DuplicateEventType(String),

    /// No aggregate handler is wired under a type name.
    #[error("no aggregate wired as {0}")]
    UnknownAggregateType(String),

    /// A payload does not fit the shape registered for its event type.
    #[error("could not decode payload of event {event_type}: {source}")]
    PayloadDecode {
        /// The event type whose payload failed to decode.
        event_type: String,
        /// The underlying decoding error.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded to or decoded from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An event does not belong where it was routed: a replayed event of
    /// another aggregate type, or an inbound envelope whose event type
    /// differs from the declared one.
    #[error("mismatched event type: expected {expected}, found {found}")]
    MismatchedEventType {
        /// The type the receiver expected.
        expected: String,
        /// The type recorded on the event.
        found: String,
    },

    /// An event could not be applied to an aggregate.
    #[error("failed to apply event {} v{}: {source}", .event.event_type, .event.version)]
    ApplyEvent {
        /// The event that caused the failure.
        event: Box<Event>,
        /// The error raised by the aggregate.
        #[source]
        source: Box<DomainError>,
    },

    /// Optimistic concurrency conflict.
    #[error(
        "version conflict on {aggregate_type}/{aggregate_id}: expected version {expected}, found {actual}"
    )]
    VersionConflict {
        /// Type of the aggregate that had the conflict.
        aggregate_type: String,
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The version the caller expected.
        expected: i64,
        /// The version recorded by the store.
        actual: i64,
    },

    /// The aggregate version went backwards while handling a command.
    #[error("aggregate version went from {original} to {current}")]
    WrongVersion {
        /// Version after snapshot load.
        original: i64,
        /// Version after the command was committed.
        current: i64,
    },

    /// No handler is registered for a command type.
    #[error("no handler registered for command {0}")]
    NoHandlerRegistered(&'static str),

    /// A handler is already registered for a command type.
    #[error("a handler is already registered for command {0}")]
    DuplicateHandler(&'static str),

    /// An aggregate received a command it does not understand.
    #[error("aggregate {aggregate_type} cannot handle command {command}")]
    UnexpectedCommand {
        /// The aggregate type that received the command.
        aggregate_type: String,
        /// The command type name.
        command: &'static str,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A data store failure.
    #[error("store error: {0}")]
    Store(String),

    /// A connection could not be established within the allowed attempts.
    #[error("could not connect to {uri} after {attempts} attempts")]
    ConnectionExhausted {
        /// The address that was dialled.
        uri: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// An external publisher failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// The command bus behind a saga has been dropped.
    #[error("command bus is no longer available")]
    BusClosed,

    /// The operation observed cancellation.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation ran past its deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl DomainError {
    /// Returns `true` when the caller may reload the aggregate and retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Returns `true` for cancellation and deadline errors.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}
