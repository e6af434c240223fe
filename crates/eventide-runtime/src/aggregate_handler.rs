//! Aggregate handler: runs one command against one aggregate.
//!
//! For every command the handler rebuilds the aggregate (snapshot plus newer
//! events), lets it handle the command, appends the produced events under the
//! optimistic concurrency check, re-applies them, optionally snapshots and
//! projects it, and finally hands each committed event to the event bus in
//! commit order. A [`ReplayCommand`] skips the domain step: the aggregate is
//! rebuilt and its snapshot and projection are written again.
//!
//! Nothing is retried here. A `VersionConflict` goes back to the caller, who
//! may reload and retry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use eventide_core::aggregate::Aggregate;
use eventide_core::command::{Command, CommandHandler};
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::store::{DataStore, ProjectedAggregate, Snapshot};

use crate::event_bus::EventBus;
use crate::replay::{AggregateFactory, Loaded, Loader, replay};

/// Default snapshot revision label.
pub const DEFAULT_SNAPSHOT_REVISION: &str = "v1";

/// When to snapshot an aggregate, and under which revision label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Snapshot once a command advances the aggregate by more than this many
    /// versions past the restored snapshot. Negative disables snapshotting.
    pub min_version_diff: i64,
    /// Label stored with each snapshot.
    pub revision: String,
}

impl SnapshotPolicy {
    /// Snapshotting switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            min_version_diff: -1,
            revision: DEFAULT_SNAPSHOT_REVISION.to_owned(),
        }
    }

    /// Snapshot when the version advanced by more than `min_version_diff`.
    #[must_use]
    pub fn every(min_version_diff: i64) -> Self {
        Self {
            min_version_diff,
            revision: DEFAULT_SNAPSHOT_REVISION.to_owned(),
        }
    }

    /// Replaces the revision label.
    #[must_use]
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Returns `true` unless the threshold is negative.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.min_version_diff >= 0
    }

    /// Returns `true` if a version advance of `diff` warrants a snapshot.
    #[must_use]
    pub fn should_snapshot(&self, diff: i64) -> bool {
        self.is_enabled() && diff > self.min_version_diff
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Rebuilds one aggregate from its stream without handling a command.
///
/// Used after a snapshot revision change, or to backfill projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayCommand {
    /// The aggregate type to rebuild.
    pub aggregate_type: String,
    /// The aggregate to rebuild.
    pub aggregate_id: String,
}

impl ReplayCommand {
    /// Replay aggregate `aggregate_id` of type `aggregate_type`.
    #[must_use]
    pub fn new(aggregate_type: impl Into<String>, aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
        }
    }
}

impl Command for ReplayCommand {
    fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    fn command_type(&self) -> &'static str {
        "ReplayCommand"
    }
}

/// What a successfully handled command left behind.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// The aggregate the command targeted.
    pub aggregate_id: String,
    /// The aggregate type.
    pub aggregate_type: String,
    /// Aggregate version after the command.
    pub version: i64,
    /// Events committed by the command, in commit order.
    pub events: Vec<Event>,
}

/// Command handler for one aggregate type.
pub struct AggregateHandler<A> {
    loader: Loader<A>,
    bus: Arc<EventBus>,
    projecting: bool,
}

impl<A: Aggregate> AggregateHandler<A> {
    /// Creates a handler for aggregates named `type_name`.
    pub fn new(
        type_name: impl Into<String>,
        factory: impl Fn(&str, &str) -> A + Send + Sync + 'static,
        store: Arc<dyn DataStore>,
        bus: Arc<EventBus>,
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
            bus,
            projecting: false,
        }
    }

    /// Persists the aggregate's state through `DataStore::save_aggregate`
    /// after every command when `project` is set.
    #[must_use]
    pub fn with_projection(mut self, project: bool) -> Self {
        self.projecting = project;
        self
    }

    /// Returns the aggregate type this handler owns.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.loader.type_name
    }

    /// Runs `command` end to end and reports what was committed.
    ///
    /// # Errors
    ///
    /// Fails fast at the first failing step: replay (`MismatchedEventType`,
    /// `ApplyEvent`, `UnknownEventType`), command handling (domain errors),
    /// persistence (`VersionConflict`, `Store`), projection or publishing.
    /// Projection and publishing errors are returned after the events have
    /// been committed. A [`ReplayCommand`] for another aggregate type fails
    /// with `UnknownAggregateType`.
    pub async fn execute(
        &self,
        ctx: &Context,
        command: &dyn Command,
    ) -> Result<CommandOutcome, DomainError> {
        let span = tracing::info_span!(
            "handle_command",
            aggregate_type = %self.loader.type_name,
            aggregate_id = %command.aggregate_id(),
            command = command.command_type(),
            correlation_id = %ctx.correlation_id(),
        );
        self.run(ctx, command).instrument(span).await
    }

    async fn run(&self, ctx: &Context, command: &dyn Command) -> Result<CommandOutcome, DomainError> {
        ctx.check()?;
        let replaying = command.downcast_ref::<ReplayCommand>();
        if let Some(request) =
            replaying.filter(|request| request.aggregate_type != self.loader.type_name)
        {
            return Err(DomainError::UnknownAggregateType(request.aggregate_type.clone()));
        }
        let Loaded {
            mut aggregate,
            snapshot_version: original_version,
            replayed,
        } = self.loader.load(ctx, command.aggregate_id()).await?;
        let expected_version = aggregate.version();
        tracing::debug!(original_version, replayed, version = expected_version, "aggregate rebuilt");

        if replaying.is_some() {
            tracing::debug!("replay requested, command handling skipped");
        } else if let Err(err) = aggregate.handle_command(ctx, command).await {
            aggregate.root_mut().clear_uncommitted_events();
            tracing::debug!(error = %err, "command rejected");
            return Err(err);
        }

        let events = aggregate.root_mut().take_uncommitted_events();
        if !events.is_empty() {
            self.loader
                .store
                .save_events(ctx, &events, expected_version)
                .await?;
            replay(&mut aggregate, &events)?;
            tracing::debug!(committed = events.len(), version = aggregate.version(), "events committed");
        }

        let diff = aggregate.version() - original_version;
        if diff < 0 {
            return Err(DomainError::WrongVersion {
                original: original_version,
                current: aggregate.version(),
            });
        }
        if self.loader.snapshots.should_snapshot(diff) {
            self.snapshot(ctx, &aggregate).await;
        }
        if self.projecting {
            self.project(ctx, &aggregate).await?;
        }

        for event in &events {
            self.bus.publish_to_local(ctx, event).await?;
        }

        Ok(CommandOutcome {
            aggregate_id: aggregate.id().to_owned(),
            aggregate_type: aggregate.type_name().to_owned(),
            version: aggregate.version(),
            events,
        })
    }

    /// Saves a snapshot. The events are already committed, so a failure is
    /// only logged.
    async fn snapshot(&self, ctx: &Context, aggregate: &A) {
        let state = match serde_json::to_value(aggregate) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "aggregate state does not serialize, snapshot skipped");
                return;
            }
        };
        let snapshot = Snapshot {
            aggregate_id: aggregate.id().to_owned(),
            aggregate_type: aggregate.type_name().to_owned(),
            revision: self.loader.snapshots.revision.clone(),
            version: aggregate.version(),
            state,
            taken_at: ctx.now(),
        };
        match self.loader.store.save_snapshot(ctx, &snapshot).await {
            Ok(()) => tracing::debug!(version = snapshot.version, "snapshot saved"),
            Err(err) => tracing::warn!(error = %err, version = snapshot.version, "snapshot save failed"),
        }
    }

    /// Writes the aggregate's current state as its projection. Queries read
    /// it, so unlike a snapshot a failure is returned.
    async fn project(&self, ctx: &Context, aggregate: &A) -> Result<(), DomainError> {
        let projected = ProjectedAggregate {
            aggregate_id: aggregate.id().to_owned(),
            aggregate_type: aggregate.type_name().to_owned(),
            version: aggregate.version(),
            state: serde_json::to_value(aggregate)?,
            projected_at: ctx.now(),
        };
        self.loader
            .store
            .save_aggregate(ctx, &projected)
            .await
            .inspect_err(|err| tracing::error!(error = %err, "aggregate projection failed"))?;
        tracing::debug!(version = projected.version, "aggregate projected");
        Ok(())
    }
}

#[async_trait]
impl<A: Aggregate> CommandHandler for AggregateHandler<A> {
    async fn handle_command(&self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
        self.execute(ctx, command).await.map(|_| ())
    }
}
