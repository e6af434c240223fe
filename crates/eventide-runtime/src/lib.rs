//! Eventide Runtime — routing and orchestration.
//!
//! This crate wires the pieces from `eventide-core` into a working system:
//! the aggregate handler runs one command end to end, the command bus routes
//! commands to their handler, the event bus fans committed events out to
//! local handlers and external publishers, and sagas turn events back into
//! commands. Middleware wraps command handlers. [`engine::EngineBuilder`] assembles all of it once at start-up.

pub mod aggregate_handler;
pub mod command_bus;
pub mod config;
pub mod engine;
pub mod event_bus;
pub mod inbound;
pub mod matcher;
pub mod middleware;
pub mod reader;
pub mod replay;
pub mod saga;

pub use aggregate_handler::{AggregateHandler, CommandOutcome, ReplayCommand, SnapshotPolicy};
pub use command_bus::CommandBus;
pub use config::{ConfigError, EngineConfig};
pub use engine::{AggregateWiring, Engine, EngineBuilder};
pub use event_bus::{EventBus, PublishMode};
pub use matcher::EventMatcher;
pub use middleware::{CommandMiddleware, layer};
pub use reader::AggregateReader;
pub use saga::{Saga, SagaHandler};
