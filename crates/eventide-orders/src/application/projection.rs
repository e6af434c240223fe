//! Order summary projection.
//!
//! Folds order and inventory events into one read model per order. The
//! projection sees local-only events too, so note counts are complete even
//! though notes are never published.

use std::collections::BTreeMap;

use async_trait::async_trait;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::handler::EventHandler;
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::events::{InventoryReserved, OrderCreated, OrderNoteAdded};

/// Read model of one order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    /// The order identifier.
    pub order_id: String,
    /// The ordered item.
    pub item: String,
    /// Number of internal notes.
    pub notes: usize,
    /// Whether stock has been reserved.
    pub reserved: bool,
}

/// In-memory projection of [`OrderSummary`] rows keyed by order id.
#[derive(Debug, Default)]
pub struct OrderSummaryProjection {
    rows: RwLock<BTreeMap<String, OrderSummary>>,
}

impl OrderSummaryProjection {
    /// Creates an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the summary for `order_id`, if the order exists.
    #[must_use]
    pub fn summary(&self, order_id: &str) -> Option<OrderSummary> {
        self.rows.read().get(order_id).cloned()
    }

    /// Returns every summary, ordered by order id.
    #[must_use]
    pub fn summaries(&self) -> Vec<OrderSummary> {
        self.rows.read().values().cloned().collect()
    }
}

#[async_trait]
impl EventHandler for OrderSummaryProjection {
    async fn handle_event(&self, _ctx: &Context, event: &Event) -> Result<(), DomainError> {
        if event.is::<OrderCreated>() {
            let OrderCreated { item } = event.decode()?;
            self.rows.write().insert(
                event.aggregate_id.clone(),
                OrderSummary {
                    order_id: event.aggregate_id.clone(),
                    item,
                    ..OrderSummary::default()
                },
            );
        } else if event.is::<OrderNoteAdded>() {
            if let Some(row) = self.rows.write().get_mut(&event.aggregate_id) {
                row.notes += 1;
            }
        } else if event.is::<InventoryReserved>() {
            let InventoryReserved { order_id } = event.decode()?;
            match self.rows.write().get_mut(&order_id) {
                Some(row) => row.reserved = true,
                None => tracing::warn!(%order_id, "reservation for unknown order"),
            }
        }
        Ok(())
    }
}
