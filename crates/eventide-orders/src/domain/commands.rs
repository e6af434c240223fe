//! Commands for the Orders & Inventory context.

use eventide_core::command::Command;

/// Command to place an order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The order identifier.
    pub aggregate_id: String,
    /// The ordered item.
    pub item: String,
}

impl Command for CreateOrder {
    fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    fn command_type(&self) -> &'static str {
        "CreateOrder"
    }
}

/// Command to attach an internal note to an order.
#[derive(Debug, Clone)]
pub struct AddOrderNote {
    /// The order identifier.
    pub aggregate_id: String,
    /// The note text.
    pub note: String,
}

impl Command for AddOrderNote {
    fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    fn command_type(&self) -> &'static str {
        "AddOrderNote"
    }
}

/// Command to reserve stock for an order. The inventory stream shares the
/// order's identifier.
#[derive(Debug, Clone)]
pub struct ReserveInventory {
    /// The order identifier.
    pub aggregate_id: String,
}

impl Command for ReserveInventory {
    fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    fn command_type(&self) -> &'static str {
        "ReserveInventory"
    }
}
