//! In-memory implementation of the `DataStore` trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::registry::EventRegistry;
use eventide_core::store::{DataStore, ProjectedAggregate, Snapshot, single_stream};

use crate::{check_contiguous, decode_stored};

type StreamKey = (String, String);
type SnapshotKey = (String, String, String);

#[derive(Debug, Default)]
struct Stream {
    version: i64,
    documents: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    closed: bool,
    streams: HashMap<StreamKey, Stream>,
    snapshots: HashMap<SnapshotKey, Vec<u8>>,
    aggregates: HashMap<StreamKey, Vec<u8>>,
}

impl State {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.closed {
            return Err(DomainError::Store("data store is closed".to_owned()));
        }
        Ok(())
    }
}

/// Data store that keeps serialized event documents in process memory.
///
/// Streams are keyed by `(aggregate_type, aggregate_id)`. The version check
/// and the append happen under one lock acquisition.
#[derive(Debug)]
pub struct MemoryStore {
    registry: Arc<EventRegistry>,
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store that decodes loaded events through `registry`.
    #[must_use]
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            state: Mutex::new(State::default()),
        }
    }

    /// Appends an event document without any version check. Intended for
    /// seeding tests with data the normal write path would refuse, such as
    /// events of unregistered types.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the event cannot be encoded.
    pub fn insert_raw(&self, event: &Event) -> Result<(), DomainError> {
        let document = serde_json::to_vec(event)?;
        let mut state = self.state.lock();
        let stream = state
            .streams
            .entry((event.aggregate_type.clone(), event.aggregate_id.clone()))
            .or_default();
        stream.version = stream.version.max(event.version);
        stream.documents.push(document);
        Ok(())
    }

    /// Returns the number of stored snapshots across all aggregates.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.state.lock().snapshots.len()
    }

    /// Returns the number of projected aggregates.
    #[must_use]
    pub fn projection_count(&self) -> usize {
        self.state.lock().aggregates.len()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    #[tracing::instrument(skip(self, ctx, events), fields(count = events.len()))]
    async fn save_events(
        &self,
        ctx: &Context,
        events: &[Event],
        expected_version: i64,
    ) -> Result<(), DomainError> {
        ctx.check()?;
        let Some((aggregate_type, aggregate_id)) = single_stream(events)? else {
            return Ok(());
        };
        check_contiguous(events, expected_version)?;
        let documents = events
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state.lock();
        state.ensure_open()?;
        let stream = state
            .streams
            .entry((aggregate_type.to_owned(), aggregate_id.to_owned()))
            .or_default();
        if stream.version != expected_version {
            return Err(DomainError::VersionConflict {
                aggregate_type: aggregate_type.to_owned(),
                aggregate_id: aggregate_id.to_owned(),
                expected: expected_version,
                actual: stream.version,
            });
        }
        stream.version = events.last().map_or(expected_version, |event| event.version);
        stream.documents.extend(documents);
        tracing::debug!(aggregate_type, aggregate_id, version = stream.version, "events appended");
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn load_events(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
        from_version: i64,
    ) -> Result<Vec<Event>, DomainError> {
        ctx.check()?;
        let stored: Vec<Event> = {
            let state = self.state.lock();
            state.ensure_open()?;
            let key = (aggregate_type.to_owned(), aggregate_id.to_owned());
            let Some(stream) = state.streams.get(&key) else {
                return Ok(Vec::new());
            };
            stream
                .documents
                .iter()
                .map(|document| serde_json::from_slice::<Event>(document))
                .collect::<Result<_, _>>()?
        };

        let mut events = stored
            .into_iter()
            .filter(|event| event.version > from_version)
            .map(|event| decode_stored(&self.registry, event))
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by_key(|event| event.version);
        Ok(events)
    }

    async fn stream_version(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<i64, DomainError> {
        ctx.check()?;
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state
            .streams
            .get(&(aggregate_type.to_owned(), aggregate_id.to_owned()))
            .map_or(0, |stream| stream.version))
    }

    #[tracing::instrument(skip(self, ctx, snapshot), fields(
        aggregate_type = %snapshot.aggregate_type,
        aggregate_id = %snapshot.aggregate_id,
        version = snapshot.version,
    ))]
    async fn save_snapshot(&self, ctx: &Context, snapshot: &Snapshot) -> Result<(), DomainError> {
        ctx.check()?;
        let document = serde_json::to_vec(snapshot)?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.snapshots.insert(
            (
                snapshot.aggregate_type.clone(),
                snapshot.aggregate_id.clone(),
                snapshot.revision.clone(),
            ),
            document,
        );
        Ok(())
    }

    async fn load_snapshot(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
        revision: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        ctx.check()?;
        let state = self.state.lock();
        state.ensure_open()?;
        let key = (
            aggregate_type.to_owned(),
            aggregate_id.to_owned(),
            revision.to_owned(),
        );
        state
            .snapshots
            .get(&key)
            .map(|document| serde_json::from_slice::<Snapshot>(document))
            .transpose()
            .map_err(DomainError::from)
    }

    #[tracing::instrument(skip(self, ctx, aggregate), fields(
        aggregate_type = %aggregate.aggregate_type,
        aggregate_id = %aggregate.aggregate_id,
        version = aggregate.version,
    ))]
    async fn save_aggregate(
        &self,
        ctx: &Context,
        aggregate: &ProjectedAggregate,
    ) -> Result<(), DomainError> {
        ctx.check()?;
        let document = serde_json::to_vec(aggregate)?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.aggregates.insert(
            (aggregate.aggregate_type.clone(), aggregate.aggregate_id.clone()),
            document,
        );
        Ok(())
    }

    async fn load_aggregate(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<Option<ProjectedAggregate>, DomainError> {
        ctx.check()?;
        let state = self.state.lock();
        state.ensure_open()?;
        state
            .aggregates
            .get(&(aggregate_type.to_owned(), aggregate_id.to_owned()))
            .map(|document| serde_json::from_slice::<ProjectedAggregate>(document))
            .transpose()
            .map_err(DomainError::from)
    }

    async fn close(&self) -> Result<(), DomainError> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            tracing::debug!("memory store closed");
        }
        Ok(())
    }
}
