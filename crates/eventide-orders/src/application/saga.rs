//! Reservation saga: every new order asks inventory to reserve stock.

use async_trait::async_trait;
use eventide_core::command::Command;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_runtime::{EventMatcher, Saga};

use crate::domain::commands::ReserveInventory;
use crate::domain::events::OrderCreated;

/// Answers `OrderCreated` with `ReserveInventory` for the same id.
#[derive(Debug, Default)]
pub struct ReservationSaga;

impl ReservationSaga {
    /// Events this saga reacts to.
    #[must_use]
    pub fn matcher() -> EventMatcher {
        EventMatcher::of::<OrderCreated>()
    }
}

#[async_trait]
impl Saga for ReservationSaga {
    async fn run(&self, _ctx: &Context, event: &Event) -> Result<Vec<Box<dyn Command>>, DomainError> {
        Ok(vec![Box::new(ReserveInventory {
            aggregate_id: event.aggregate_id.clone(),
        })])
    }

    fn name(&self) -> &'static str {
        "reservation"
    }
}
