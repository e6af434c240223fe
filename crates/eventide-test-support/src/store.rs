//! Test data stores — mock `DataStore` implementations for tests.

use std::sync::Arc;

use async_trait::async_trait;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::store::{DataStore, ProjectedAggregate, Snapshot};

fn connection_refused() -> DomainError {
    DomainError::Store("connection refused".into())
}

/// A data store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingDataStore;

#[async_trait]
impl DataStore for FailingDataStore {
    async fn save_events(
        &self,
        _ctx: &Context,
        _events: &[Event],
        _expected_version: i64,
    ) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn load_events(
        &self,
        _ctx: &Context,
        _aggregate_id: &str,
        _aggregate_type: &str,
        _from_version: i64,
    ) -> Result<Vec<Event>, DomainError> {
        Err(connection_refused())
    }

    async fn stream_version(
        &self,
        _ctx: &Context,
        _aggregate_id: &str,
        _aggregate_type: &str,
    ) -> Result<i64, DomainError> {
        Err(connection_refused())
    }

    async fn save_snapshot(&self, _ctx: &Context, _snapshot: &Snapshot) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn load_snapshot(
        &self,
        _ctx: &Context,
        _aggregate_id: &str,
        _aggregate_type: &str,
        _revision: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        Err(connection_refused())
    }

    async fn save_aggregate(
        &self,
        _ctx: &Context,
        _aggregate: &ProjectedAggregate,
    ) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn load_aggregate(
        &self,
        _ctx: &Context,
        _aggregate_id: &str,
        _aggregate_type: &str,
    ) -> Result<Option<ProjectedAggregate>, DomainError> {
        Err(connection_refused())
    }

    async fn close(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Wraps a working store and fails every snapshot read and write, leaving
/// the event log untouched. Projection writes pass through unless
/// [`SnapshotFailingStore::failing_projections`] is set.
pub struct SnapshotFailingStore {
    inner: Arc<dyn DataStore>,
    fail_projections: bool,
}

impl SnapshotFailingStore {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn DataStore>) -> Self {
        Self {
            inner,
            fail_projections: false,
        }
    }

    /// Also fail every projection write.
    #[must_use]
    pub fn failing_projections(mut self) -> Self {
        self.fail_projections = true;
        self
    }
}

#[async_trait]
impl DataStore for SnapshotFailingStore {
    async fn save_events(
        &self,
        ctx: &Context,
        events: &[Event],
        expected_version: i64,
    ) -> Result<(), DomainError> {
        self.inner.save_events(ctx, events, expected_version).await
    }

    async fn load_events(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
        from_version: i64,
    ) -> Result<Vec<Event>, DomainError> {
        self.inner
            .load_events(ctx, aggregate_id, aggregate_type, from_version)
            .await
    }

    async fn stream_version(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<i64, DomainError> {
        self.inner
            .stream_version(ctx, aggregate_id, aggregate_type)
            .await
    }

    async fn save_snapshot(&self, _ctx: &Context, _snapshot: &Snapshot) -> Result<(), DomainError> {
        Err(DomainError::Store("snapshot collection unavailable".into()))
    }

    async fn load_snapshot(
        &self,
        _ctx: &Context,
        _aggregate_id: &str,
        _aggregate_type: &str,
        _revision: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        Err(DomainError::Store("snapshot collection unavailable".into()))
    }

    async fn save_aggregate(
        &self,
        ctx: &Context,
        aggregate: &ProjectedAggregate,
    ) -> Result<(), DomainError> {
        if self.fail_projections {
            return Err(DomainError::Store("projection collection unavailable".into()));
        }
        self.inner.save_aggregate(ctx, aggregate).await
    }

    async fn load_aggregate(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<Option<ProjectedAggregate>, DomainError> {
        self.inner
            .load_aggregate(ctx, aggregate_id, aggregate_type)
            .await
    }

    async fn close(&self) -> Result<(), DomainError> {
        self.inner.close().await
    }
}
