//! Integration tests for `PgDataStore`.

use std::sync::Arc;

use chrono::Utc;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::registry::{EventRegistry, PayloadShape};
use eventide_core::store::{DataStore, ProjectedAggregate, Snapshot};
use eventide_store::pg_data_store::PgDataStore;
use sqlx::PgPool;

fn make_store(pool: PgPool) -> PgDataStore {
    let registry = EventRegistry::new();
    registry
        .register_shape("TestEvent", PayloadShape::opaque(), false)
        .unwrap();
    PgDataStore::new(pool, Arc::new(registry))
}

/// Helper to build an `Event` with sensible defaults.
fn make_event(aggregate_id: &str, version: i64) -> Event {
    Event {
        aggregate_id: aggregate_id.to_string(),
        aggregate_type: "Order".to_string(),
        event_type: "TestEvent".to_string(),
        version,
        timestamp: Utc::now(),
        data: serde_json::json!({"key": "value"}),
    }
}

// --- load_events ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_events_returns_empty_vec_for_nonexistent_aggregate(pool: PgPool) {
    let store = make_store(pool);

    let events = store
        .load_events(&Context::new(), "missing", "Order", 0)
        .await
        .unwrap();

    assert!(events.is_empty());
}

// --- save_events + load_events ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_and_load_single_event(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();
    let event = make_event("A1", 1);

    store.save_events(&ctx, &[event.clone()], 0).await.unwrap();

    let loaded = store.load_events(&ctx, "A1", "Order", 0).await.unwrap();
    assert_eq!(loaded.len(), 1);
    let e = &loaded[0];
    assert_eq!(e.aggregate_id, "A1");
    assert_eq!(e.aggregate_type, "Order");
    assert_eq!(e.event_type, "TestEvent");
    assert_eq!(e.version, 1);
    assert_eq!(e.data, event.data);
    // PostgreSQL TIMESTAMPTZ has microsecond precision.
    assert_eq!(
        e.timestamp.timestamp_micros(),
        event.timestamp.timestamp_micros()
    );
    assert_eq!(store.stream_version(&ctx, "A1", "Order").await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_events_after_version_preserves_order(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();
    let events = vec![make_event("A1", 1), make_event("A1", 2), make_event("A1", 3)];

    store.save_events(&ctx, &events, 0).await.unwrap();

    let loaded = store.load_events(&ctx, "A1", "Order", 1).await.unwrap();
    let versions: Vec<i64> = loaded.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![2, 3]);
}

// --- aggregate isolation ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_aggregate_isolation(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();

    store.save_events(&ctx, &[make_event("A1", 1)], 0).await.unwrap();
    store.save_events(&ctx, &[make_event("B1", 1)], 0).await.unwrap();

    let loaded_a = store.load_events(&ctx, "A1", "Order", 0).await.unwrap();
    let loaded_b = store.load_events(&ctx, "B1", "Order", 0).await.unwrap();
    assert_eq!(loaded_a.len(), 1);
    assert_eq!(loaded_b.len(), 1);
    assert_eq!(loaded_b[0].aggregate_id, "B1");
}

// --- optimistic concurrency ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_version_conflict_on_repeated_first_append(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();

    store.save_events(&ctx, &[make_event("A1", 1)], 0).await.unwrap();
    let result = store.save_events(&ctx, &[make_event("A1", 1)], 0).await;

    match result {
        Err(DomainError::VersionConflict {
            aggregate_id,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(aggregate_id, "A1");
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected VersionConflict, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_expected_version_rejects_whole_batch(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();
    store
        .save_events(&ctx, &[make_event("A1", 1), make_event("A1", 2)], 0)
        .await
        .unwrap();

    // Versions 2-3 continue from the stale version 1, so only the check fails.
    let result = store
        .save_events(&ctx, &[make_event("A1", 2), make_event("A1", 3)], 1)
        .await;

    assert!(matches!(
        result,
        Err(DomainError::VersionConflict { expected: 1, actual: 2, .. })
    ));
    assert_eq!(store.load_events(&ctx, "A1", "Order", 0).await.unwrap().len(), 2);
    assert_eq!(store.stream_version(&ctx, "A1", "Order").await.unwrap(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_appends_admit_exactly_one_winner(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();
    store.save_events(&ctx, &[make_event("A1", 1)], 0).await.unwrap();

    let first = [make_event("A1", 2)];
    let second = [make_event("A1", 2)];
    let (x, y) = tokio::join!(
        store.save_events(&ctx, &first, 1),
        store.save_events(&ctx, &second, 1)
    );

    let conflicts = [&x, &y]
        .iter()
        .filter(|r| matches!(r, Err(DomainError::VersionConflict { .. })))
        .count();
    assert_eq!(conflicts, 1);
    assert!(x.is_ok() || y.is_ok());
    assert_eq!(store.stream_version(&ctx, "A1", "Order").await.unwrap(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_sequential_appends_with_correct_expected_version(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();

    store
        .save_events(&ctx, &[make_event("A1", 1), make_event("A1", 2)], 0)
        .await
        .unwrap();
    store
        .save_events(&ctx, &[make_event("A1", 3), make_event("A1", 4)], 2)
        .await
        .unwrap();

    let loaded = store.load_events(&ctx, "A1", "Order", 0).await.unwrap();
    assert_eq!(loaded.len(), 4);
    for (i, event) in loaded.iter().enumerate() {
        assert_eq!(event.version, i64::try_from(i + 1).unwrap());
    }
}

// --- edge cases ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_empty_events_is_noop(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();

    store.save_events(&ctx, &[], 0).await.unwrap();

    assert_eq!(store.stream_version(&ctx, "A1", "Order").await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unknown_event_type_fails_load(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();
    let mut typo = make_event("A1", 1);
    typo.event_type = "Typo".to_string();
    // The write path does not consult the registry.
    store.save_events(&ctx, &[typo], 0).await.unwrap();

    let result = store.load_events(&ctx, "A1", "Order", 0).await;

    assert!(matches!(result, Err(DomainError::UnknownEventType(name)) if name == "Typo"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_complex_json_payload_round_trip(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();
    let complex_payload = serde_json::json!({
        "nested": {"key": "value", "number": 42},
        "array": [1, "two", null, true, false],
        "null_field": null,
        "empty_object": {},
        "empty_array": []
    });
    let mut event = make_event("A1", 1);
    event.data = complex_payload.clone();

    store.save_events(&ctx, &[event], 0).await.unwrap();

    let loaded = store.load_events(&ctx, "A1", "Order", 0).await.unwrap();
    assert_eq!(loaded[0].data, complex_payload);
}

// --- snapshots ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_snapshot_upsert_and_revision_isolation(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();
    let snapshot = |version: i64, revision: &str| Snapshot {
        aggregate_id: "A1".to_string(),
        aggregate_type: "Order".to_string(),
        revision: revision.to_string(),
        version,
        state: serde_json::json!({"version": version}),
        taken_at: Utc::now(),
    };

    store.save_snapshot(&ctx, &snapshot(3, "v1")).await.unwrap();
    store.save_snapshot(&ctx, &snapshot(6, "v1")).await.unwrap();
    store.save_snapshot(&ctx, &snapshot(4, "v2")).await.unwrap();

    let v1 = store.load_snapshot(&ctx, "A1", "Order", "v1").await.unwrap().unwrap();
    let v2 = store.load_snapshot(&ctx, "A1", "Order", "v2").await.unwrap().unwrap();
    let missing = store.load_snapshot(&ctx, "A1", "Order", "v9").await.unwrap();
    assert_eq!(v1.version, 6);
    assert_eq!(v1.state, serde_json::json!({"version": 6}));
    assert_eq!(v2.version, 4);
    assert!(missing.is_none());
}

// --- projected aggregates ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_projected_aggregate_upsert_keeps_latest_state(pool: PgPool) {
    // Arrange
    let store = make_store(pool);
    let ctx = Context::new();
    let projected = |version: i64| ProjectedAggregate {
        aggregate_id: "A1".to_string(),
        aggregate_type: "Order".to_string(),
        version,
        state: serde_json::json!({"notes": version}),
        projected_at: Utc::now(),
    };

    // Act
    store.save_aggregate(&ctx, &projected(2)).await.unwrap();
    store.save_aggregate(&ctx, &projected(5)).await.unwrap();

    // Assert
    let loaded = store.load_aggregate(&ctx, "A1", "Order").await.unwrap().unwrap();
    assert_eq!(loaded.version, 5);
    assert_eq!(loaded.state, serde_json::json!({"notes": 5}));
    assert!(store.load_aggregate(&ctx, "B1", "Order").await.unwrap().is_none());
}

// --- lifecycle ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_operations_after_close_fail(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();

    store.close().await.unwrap();
    store.close().await.unwrap();

    assert!(matches!(
        store.load_events(&ctx, "A1", "Order", 0).await,
        Err(DomainError::Store(message)) if message == "data store is closed"
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_cancelled_context_aborts_save(pool: PgPool) {
    let store = make_store(pool);
    let ctx = Context::new();
    ctx.cancel();

    let result = store.save_events(&ctx, &[make_event("A1", 1)], 0).await;

    assert!(matches!(result, Err(DomainError::Cancelled)));
    assert_eq!(
        store.stream_version(&Context::new(), "A1", "Order").await.unwrap(),
        0
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_migrate_is_idempotent(pool: PgPool) {
    let store = make_store(pool);

    store.migrate().await.unwrap();
    store.migrate().await.unwrap();
}
