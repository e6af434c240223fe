//! Shared test doubles and utilities for the Eventide runtime.

mod clock;
mod handler;
mod publisher;
mod store;
mod tracing;

pub use clock::FixedClock;
pub use handler::{FailingEventHandler, RecordingEventHandler};
pub use publisher::{FailingPublisher, RecordingPublisher};
pub use store::{FailingDataStore, SnapshotFailingStore};
pub use tracing::init_tracing;
