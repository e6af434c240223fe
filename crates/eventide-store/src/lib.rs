//! Eventide data stores.
//!
//! `MemoryStore` keeps everything in process and is meant for tests and
//! single-process tools; `PgDataStore` persists JSONB documents in
//! PostgreSQL. Both honour the `DataStore` contract from `eventide-core`.

pub mod memory_store;
pub mod pg_data_store;
pub mod schema;

use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::registry::EventRegistry;

/// Re-checks a stored event against the registry before handing it out.
pub(crate) fn decode_stored(registry: &EventRegistry, mut event: Event) -> Result<Event, DomainError> {
    let data = std::mem::take(&mut event.data);
    event.data = registry.decode_value(&event.event_type, data)?;
    Ok(event)
}

/// Checks that `events` continue the stream at `expected_version + 1`
/// without gaps.
pub(crate) fn check_contiguous(events: &[Event], expected_version: i64) -> Result<(), DomainError> {
    let mut next = expected_version + 1;
    for event in events {
        if event.version != next {
            return Err(DomainError::Store(format!(
                "event {} has version {}, expected {next}",
                event.event_type, event.version
            )));
        }
        next += 1;
    }
    Ok(())
}
