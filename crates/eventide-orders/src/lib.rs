//! Eventide — Orders & Inventory bounded context.
//!
//! Orders are placed against an item; a reservation saga answers every new
//! order by reserving inventory for it, and a projection keeps a per-order
//! summary for queries.

pub mod application {
    pub mod projection;
    pub mod query_handlers;
    pub mod saga;
    pub mod wiring;
}

pub mod domain {
    pub mod aggregates;
    pub mod commands;
    pub mod events;
}
