//! `PostgreSQL` implementation of the `DataStore` trait.
//!
//! Event documents, snapshots and projected aggregates are stored as JSONB. Appends run in one
//! transaction: the recorded stream version is read `FOR UPDATE`, compared
//! with the caller's expectation and advanced with a conditional update, then
//! the event rows are inserted. A unique violation on any insert is reported
//! as a version conflict.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::registry::EventRegistry;
use eventide_core::store::{DataStore, ProjectedAggregate, Snapshot, single_stream};

use crate::{check_contiguous, decode_stored, schema};

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    aggregate_id: String,
    aggregate_type: String,
    event_type: String,
    version: i64,
    occurred_at: DateTime<Utc>,
    data: serde_json::Value,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            event_type: row.event_type,
            version: row.version,
            timestamp: row.occurred_at,
            data: row.data,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    aggregate_id: String,
    aggregate_type: String,
    revision: String,
    version: i64,
    state: serde_json::Value,
    taken_at: DateTime<Utc>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            revision: row.revision,
            version: row.version,
            state: row.state,
            taken_at: row.taken_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectionRow {
    aggregate_id: String,
    aggregate_type: String,
    version: i64,
    state: serde_json::Value,
    projected_at: DateTime<Utc>,
}

impl From<ProjectionRow> for ProjectedAggregate {
    fn from(row: ProjectionRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            version: row.version,
            state: row.state,
            projected_at: row.projected_at,
        }
    }
}

fn store_error(err: sqlx::Error) -> DomainError {
    DomainError::Store(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// PostgreSQL-backed data store.
#[derive(Debug, Clone)]
pub struct PgDataStore {
    pool: PgPool,
    registry: Arc<EventRegistry>,
}

impl PgDataStore {
    /// Creates a new `PgDataStore`.
    #[must_use]
    pub fn new(pool: PgPool, registry: Arc<EventRegistry>) -> Self {
        Self { pool, registry }
    }

    /// Creates the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Store` if any DDL statement fails.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        for statement in schema::ALL {
            sqlx::raw_sql(statement)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
        }
        tracing::info!("event store schema ready");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.pool.is_closed() {
            return Err(DomainError::Store("data store is closed".to_owned()));
        }
        Ok(())
    }

    async fn recorded_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<i64>, DomainError> {
        sqlx::query_scalar(
            "SELECT version FROM es_aggregates \
             WHERE aggregate_type = $1 AND aggregate_id = $2 FOR UPDATE",
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(store_error)
    }

    async fn append(
        &self,
        events: &[Event],
        aggregate_type: &str,
        aggregate_id: &str,
        expected_version: i64,
    ) -> Result<(), DomainError> {
        let conflict = |actual: i64| DomainError::VersionConflict {
            aggregate_type: aggregate_type.to_owned(),
            aggregate_id: aggregate_id.to_owned(),
            expected: expected_version,
            actual,
        };
        let new_version = events.last().map_or(expected_version, |event| event.version);

        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let recorded = Self::recorded_version(&mut tx, aggregate_type, aggregate_id).await?;
        let actual = recorded.unwrap_or(0);
        if actual != expected_version {
            return Err(conflict(actual));
        }

        let swapped = match recorded {
            Some(_) => sqlx::query(
                "UPDATE es_aggregates SET version = $3, updated_at = NOW() \
                 WHERE aggregate_type = $1 AND aggregate_id = $2 AND version = $4",
            )
            .bind(aggregate_type)
            .bind(aggregate_id)
            .bind(new_version)
            .bind(expected_version)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?,
            None => sqlx::query(
                "INSERT INTO es_aggregates (aggregate_type, aggregate_id, version) \
                 VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(aggregate_type)
            .bind(aggregate_id)
            .bind(new_version)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?,
        };
        if swapped.rows_affected() != 1 {
            // Another writer created the stream between our read and write.
            let actual = Self::recorded_version(&mut tx, aggregate_type, aggregate_id)
                .await?
                .unwrap_or(expected_version);
            return Err(conflict(actual));
        }

        for event in events {
            let inserted = sqlx::query(
                "INSERT INTO es_events \
                 (aggregate_type, aggregate_id, version, event_type, occurred_at, data) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&event.aggregate_type)
            .bind(&event.aggregate_id)
            .bind(event.version)
            .bind(&event.event_type)
            .bind(event.timestamp)
            .bind(&event.data)
            .execute(&mut *tx)
            .await;
            match inserted {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => return Err(conflict(event.version - 1)),
                Err(err) => return Err(store_error(err)),
            }
        }

        tx.commit().await.map_err(store_error)
    }
}

#[async_trait]
impl DataStore for PgDataStore {
    #[tracing::instrument(skip(self, ctx, events), fields(count = events.len()))]
    async fn save_events(
        &self,
        ctx: &Context,
        events: &[Event],
        expected_version: i64,
    ) -> Result<(), DomainError> {
        self.ensure_open()?;
        let Some((aggregate_type, aggregate_id)) = single_stream(events)? else {
            return Ok(());
        };
        check_contiguous(events, expected_version)?;
        ctx.run(self.append(events, aggregate_type, aggregate_id, expected_version))
            .await?;
        tracing::debug!(aggregate_type, aggregate_id, "events appended");
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
        self.ensure_open()?;
        let rows: Vec<EventRow> = ctx
            .run(async {
                sqlx::query_as(
                    "SELECT aggregate_id, aggregate_type, event_type, version, occurred_at, data \
                     FROM es_events \
                     WHERE aggregate_type = $1 AND aggregate_id = $2 AND version > $3 \
                     ORDER BY version ASC",
                )
                .bind(aggregate_type)
                .bind(aggregate_id)
                .bind(from_version)
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)
            })
            .await?;

        rows.into_iter()
            .map(|row| decode_stored(&self.registry, Event::from(row)))
            .collect()
    }

    async fn stream_version(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<i64, DomainError> {
        self.ensure_open()?;
        let version: Option<i64> = ctx
            .run(async {
                sqlx::query_scalar(
                    "SELECT version FROM es_aggregates \
                     WHERE aggregate_type = $1 AND aggregate_id = $2",
                )
                .bind(aggregate_type)
                .bind(aggregate_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)
            })
            .await?;
        Ok(version.unwrap_or(0))
    }

    #[tracing::instrument(skip(self, ctx, snapshot), fields(
        aggregate_type = %snapshot.aggregate_type,
        aggregate_id = %snapshot.aggregate_id,
        version = snapshot.version,
    ))]
    async fn save_snapshot(&self, ctx: &Context, snapshot: &Snapshot) -> Result<(), DomainError> {
        self.ensure_open()?;
        ctx.run(async {
            sqlx::query(
                "INSERT INTO es_snapshots \
                 (aggregate_type, aggregate_id, revision, version, state, taken_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (aggregate_type, aggregate_id, revision) DO UPDATE \
                 SET version = EXCLUDED.version, state = EXCLUDED.state, \
                     taken_at = EXCLUDED.taken_at",
            )
            .bind(&snapshot.aggregate_type)
            .bind(&snapshot.aggregate_id)
            .bind(&snapshot.revision)
            .bind(snapshot.version)
            .bind(&snapshot.state)
            .bind(snapshot.taken_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)
        })
        .await?;
        Ok(())
    }

    async fn load_snapshot(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
        revision: &str,
    ) -> Result<Option<Snapshot>, DomainError> {
        self.ensure_open()?;
        let row: Option<SnapshotRow> = ctx
            .run(async {
                sqlx::query_as(
                    "SELECT aggregate_id, aggregate_type, revision, version, state, taken_at \
                     FROM es_snapshots \
                     WHERE aggregate_type = $1 AND aggregate_id = $2 AND revision = $3",
                )
                .bind(aggregate_type)
                .bind(aggregate_id)
                .bind(revision)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)
            })
            .await?;
        Ok(row.map(Snapshot::from))
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
        self.ensure_open()?;
        ctx.run(async {
            sqlx::query(
                "INSERT INTO es_projections \
                 (aggregate_type, aggregate_id, version, state, projected_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 ON CONFLICT (aggregate_type, aggregate_id) DO UPDATE \
                 SET version = EXCLUDED.version, state = EXCLUDED.state, \
                     projected_at = EXCLUDED.projected_at",
            )
            .bind(&aggregate.aggregate_type)
            .bind(&aggregate.aggregate_id)
            .bind(aggregate.version)
            .bind(&aggregate.state)
            .bind(aggregate.projected_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)
        })
        .await?;
        Ok(())
    }

    async fn load_aggregate(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<Option<ProjectedAggregate>, DomainError> {
        self.ensure_open()?;
        let row: Option<ProjectionRow> = ctx
            .run(async {
                sqlx::query_as(
                    "SELECT aggregate_id, aggregate_type, version, state, projected_at \
                     FROM es_projections \
                     WHERE aggregate_type = $1 AND aggregate_id = $2",
                )
                .bind(aggregate_type)
                .bind(aggregate_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)
            })
            .await?;
        Ok(row.map(ProjectedAggregate::from))
    }

    async fn close(&self) -> Result<(), DomainError> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::debug!("postgres data store closed");
        }
        Ok(())
    }
}
