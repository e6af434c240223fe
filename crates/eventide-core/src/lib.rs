//! Eventide Core — shared event-sourcing abstractions.
//!
//! This crate defines the fundamental traits and types that the store,
//! runtime and publisher crates depend on. It contains no infrastructure code.

pub mod aggregate;
pub mod command;
pub mod context;
pub mod error;
pub mod event;
pub mod handler;
pub mod registry;
pub mod store;
