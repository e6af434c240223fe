//! Read-side access to aggregates for queries.

use std::sync::Arc;

use eventide_core::aggregate::Aggregate;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::store::DataStore;

use crate::aggregate_handler::SnapshotPolicy;
use crate::replay::{AggregateFactory, Loader};

/// Rebuilds aggregates from their snapshot and newer events without
/// handling a command. Never writes.
pub struct AggregateReader<A> {
    loader: Loader<A>,
}

impl<A: Aggregate> AggregateReader<A> {
    /// Creates a reader for aggregates named `type_name`.
    pub fn new(
        type_name: impl Into<String>,
        factory: impl Fn(&str, &str) -> A + Send + Sync + 'static,
        store: Arc<dyn DataStore>,
        snapshots: SnapshotPolicy,
    ) -> Self {
        let factory: AggregateFactory<A> = Arc::new(factory);
        Self {
            loader: Loader {
                type_name: type_name.into(),
                factory,
                store,
                snapshots,
            },
        }
    }

    /// Loads the current state of aggregate `id`.
    ///
    /// An aggregate with no events comes back at version 0.
    ///
    /// # Errors
    ///
    /// Returns the replay or store error that stopped the rebuild.
    #[tracing::instrument(skip(self, ctx), fields(aggregate_type = %self.loader.type_name))]
    pub async fn load(&self, ctx: &Context, id: &str) -> Result<A, DomainError> {
        ctx.check()?;
        Ok(self.loader.load(ctx, id).await?.aggregate)
    }

    /// Reads the projected state of aggregate `id` without touching its
    /// stream. `None` until a projecting engine has handled a command for it.
    ///
    /// # Errors
    ///
    /// Returns the store error, or `DomainError::Serialization` when the
    /// stored state no longer decodes into `A`.
    #[tracing::instrument(skip(self, ctx), fields(aggregate_type = %self.loader.type_name))]
    pub async fn load_projected(&self, ctx: &Context, id: &str) -> Result<Option<A>, DomainError> {
        let Some(projected) = self
            .loader
            .store
            .load_aggregate(ctx, id, &self.loader.type_name)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(projected.state)?))
    }
}
