//! Data store database schema.
//!
//! The document database is modelled as four tables: the recorded version of
//! each stream, the immutable event documents, the snapshots and the
//! projected aggregates. The same DDL ships as the sqlx migrations under
//! `migrations/`.

/// SQL to create the stream version table.
pub const CREATE_AGGREGATES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_aggregates (
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    VARCHAR(255) NOT NULL,
    version         BIGINT NOT NULL CHECK (version >= 0),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (aggregate_type, aggregate_id)
);
";

/// SQL to create the events table.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_events (
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    VARCHAR(255) NOT NULL,
    version         BIGINT NOT NULL CHECK (version >= 1),
    event_type      VARCHAR(255) NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL,
    data            JSONB NOT NULL,
    UNIQUE (aggregate_type, aggregate_id, version)
);
";

/// SQL to create the snapshots table.
pub const CREATE_SNAPSHOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_snapshots (
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    VARCHAR(255) NOT NULL,
    revision        VARCHAR(64) NOT NULL,
    version         BIGINT NOT NULL,
    state           JSONB NOT NULL,
    taken_at        TIMESTAMPTZ NOT NULL,
    UNIQUE (aggregate_type, aggregate_id, revision)
);
";

/// SQL to create the projected aggregates table.
pub const CREATE_PROJECTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS es_projections (
    aggregate_type  VARCHAR(255) NOT NULL,
    aggregate_id    VARCHAR(255) NOT NULL,
    version         BIGINT NOT NULL CHECK (version >= 0),
    state           JSONB NOT NULL,
    projected_at    TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (aggregate_type, aggregate_id)
);
";

/// All schema statements in creation order.
pub const ALL: [&str; 4] = [
    CREATE_AGGREGATES_TABLE,
    CREATE_EVENTS_TABLE,
    CREATE_SNAPSHOTS_TABLE,
    CREATE_PROJECTIONS_TABLE,
];
