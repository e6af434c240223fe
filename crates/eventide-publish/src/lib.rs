//! External event publishers.
//!
//! Both adapters connect through [`retry::connect_with_retry`], publish the
//! JSON event envelope once per call without retrying, and refuse to
//! publish after `close`.

pub mod config;
pub mod nats;
pub mod pubsub;
pub mod retry;

pub use config::{NatsConfig, PubSubConfig, PublisherConfigError};
pub use nats::NatsPublisher;
pub use pubsub::PubSubPublisher;
pub use retry::connect_with_retry;
