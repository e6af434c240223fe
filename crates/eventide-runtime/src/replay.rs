//! Rebuilding aggregates from snapshots and event streams.

use std::sync::Arc;

use eventide_core::aggregate::{Aggregate, apply_committed};
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::store::DataStore;

use crate::aggregate_handler::SnapshotPolicy;

/// Builds a fresh aggregate at version 0 from `(id, type_name)`.
pub type AggregateFactory<A> = Arc<dyn Fn(&str, &str) -> A + Send + Sync>;

/// Applies `events` in order, advancing the version after each one.
///
/// Stops at the first event that belongs to another aggregate type or that
/// the aggregate refuses to apply.
///
/// # Errors
///
/// Returns `DomainError::MismatchedEventType` or `DomainError::ApplyEvent`.
pub fn replay<A: Aggregate>(aggregate: &mut A, events: &[Event]) -> Result<(), DomainError> {
    events
        .iter()
        .try_for_each(|event| apply_committed(aggregate, event))
}

/// An aggregate rebuilt from storage.
pub(crate) struct Loaded<A> {
    pub(crate) aggregate: A,
    /// Version right after the snapshot was restored (0 without one).
    pub(crate) snapshot_version: i64,
    pub(crate) replayed: usize,
}

/// Shared load path of the aggregate handler and the aggregate reader.
pub(crate) struct Loader<A> {
    pub(crate) type_name: String,
    pub(crate) factory: AggregateFactory<A>,
    pub(crate) store: Arc<dyn DataStore>,
    pub(crate) snapshots: SnapshotPolicy,
}

impl<A: Aggregate> Loader<A> {
    pub(crate) async fn load(&self, ctx: &Context, id: &str) -> Result<Loaded<A>, DomainError> {
        let mut aggregate = match self.restore_snapshot(ctx, id).await? {
            Some(restored) => restored,
            None => (self.factory)(id, &self.type_name),
        };
        let snapshot_version = aggregate.version();

        let events = self
            .store
            .load_events(ctx, id, &self.type_name, snapshot_version)
            .await?;
        replay(&mut aggregate, &events)?;

        Ok(Loaded {
            aggregate,
            snapshot_version,
            replayed: events.len(),
        })
    }

    /// Best-effort snapshot load. Anything short of cancellation falls back
    /// to full replay.
    async fn restore_snapshot(&self, ctx: &Context, id: &str) -> Result<Option<A>, DomainError> {
        if !self.snapshots.is_enabled() {
            return Ok(None);
        }
        let snapshot = match self
            .store
            .load_snapshot(ctx, id, &self.type_name, &self.snapshots.revision)
            .await
        {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(None),
            Err(err) if err.is_cancellation() => return Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "snapshot load failed, replaying from the start");
                return Ok(None);
            }
        };

        let version = snapshot.version;
        match serde_json::from_value::<A>(snapshot.state) {
            Ok(aggregate)
                if aggregate.id() == id
                    && aggregate.type_name() == self.type_name
                    && aggregate.version() == version =>
            {
                tracing::debug!(version, "restored aggregate from snapshot");
                Ok(Some(aggregate))
            }
            Ok(aggregate) => {
                tracing::warn!(
                    snapshot_id = aggregate.id(),
                    snapshot_type = aggregate.type_name(),
                    snapshot_version = aggregate.version(),
                    "snapshot does not match its key, ignoring it"
                );
                Ok(None)
            }
            Err(err) => {
                tracing::warn!(error = %err, "snapshot state does not decode, ignoring it");
                Ok(None)
            }
        }
    }
}
