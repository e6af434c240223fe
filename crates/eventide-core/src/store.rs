//! Data store abstraction.
//!
//! A data store persists event streams and snapshots. Every backend honours
//! the same contract:
//!
//! - `save_events` is atomic and only succeeds when the caller's expected
//!   version equals the recorded stream version;
//! - `load_events` returns events strictly newer than `from_version`, in
//!   version order, decoded through the event registry;
//! - snapshots are keyed by `(aggregate_type, aggregate_id, revision)` and
//!   are never authoritative;
//! - projected aggregates hold the latest state of one aggregate under
//!   `(aggregate_type, aggregate_id)` for readers that do not replay.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::DomainError;
use crate::event::Event;

/// Materialized aggregate state at a given version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Aggregate identifier.
    pub aggregate_id: String,
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Schema label; snapshots with different labels coexist.
    pub revision: String,
    /// Version of the aggregate when the snapshot was taken.
    pub version: i64,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Latest materialized state of one aggregate, kept for queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedAggregate {
    /// Aggregate identifier.
    pub aggregate_id: String,
    /// Aggregate type name.
    pub aggregate_type: String,
    /// Version the state reflects.
    pub version: i64,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// When the state was written.
    pub projected_at: DateTime<Utc>,
}

/// Checks that every event in one append targets the same stream and returns
/// that stream's `(aggregate_type, aggregate_id)`.
///
/// # Errors
///
/// Returns `DomainError::Store` when the events span more than one stream.
pub fn single_stream(events: &[Event]) -> Result<Option<(&str, &str)>, DomainError> {
    let Some(first) = events.first() else {
        return Ok(None);
    };
    let mixed = events.iter().any(|event| {
        event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
    });
    if mixed {
        return Err(DomainError::Store(
            "mixed aggregate streams in one append".to_owned(),
        ));
    }
    Ok(Some((&first.aggregate_type, &first.aggregate_id)))
}

/// Durable persistence for event streams and snapshots.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Appends `events` to their stream if the recorded version equals
    /// `expected_version`. An empty slice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::VersionConflict` when the recorded version has
    /// moved, `DomainError::Store` on backend failure, or a cancellation error.
    async fn save_events(
        &self,
        ctx: &Context,
        events: &[Event],
        expected_version: i64,
    ) -> Result<(), DomainError>;

    /// Loads events with version strictly greater than `from_version`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` if any stored event is not
    /// registered; no partial result is returned.
    async fn load_events(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
        from_version: i64,
    ) -> Result<Vec<Event>, DomainError>;

    /// Returns the recorded version of a stream, 0 if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Store` on backend failure.
    async fn stream_version(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<i64, DomainError>;

    /// Inserts or replaces a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Store` on backend failure.
    async fn save_snapshot(&self, ctx: &Context, snapshot: &Snapshot) -> Result<(), DomainError>;

    /// Fetches the snapshot stored under `revision`, if any.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Store` on backend failure.
    async fn load_snapshot(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
        revision: &str,
    ) -> Result<Option<Snapshot>, DomainError>;

    /// Inserts or replaces the projected state of an aggregate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Store` on backend failure.
    async fn save_aggregate(
        &self,
        ctx: &Context,
        aggregate: &ProjectedAggregate,
    ) -> Result<(), DomainError>;

    /// Fetches the projected state of an aggregate, if any.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Store` on backend failure.
    async fn load_aggregate(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<Option<ProjectedAggregate>, DomainError>;

    /// Releases underlying connections. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Store` if the backend fails to shut down.
    async fn close(&self) -> Result<(), DomainError>;
}
