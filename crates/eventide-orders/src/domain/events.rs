//! Domain events for the Orders & Inventory context.

use eventide_core::event::EventPayload;
use serde::{Deserialize, Serialize};

/// Emitted when an order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    /// The ordered item.
    pub item: String,
}

impl EventPayload for OrderCreated {
    const EVENT_TYPE: &'static str = "OrderCreated";
}

/// Emitted when an internal note is attached to an order. Local-only: notes
/// never leave the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNoteAdded {
    /// The note text.
    pub note: String,
}

impl EventPayload for OrderNoteAdded {
    const EVENT_TYPE: &'static str = "OrderNoteAdded";
}

/// Emitted when stock has been set aside for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryReserved {
    /// The order the stock is held for.
    pub order_id: String,
}

impl EventPayload for InventoryReserved {
    const EVENT_TYPE: &'static str = "InventoryReserved";
}
