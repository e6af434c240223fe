//! Aggregate roots for the Orders & Inventory context.

use async_trait::async_trait;
use eventide_core::aggregate::{Aggregate, AggregateRoot};
use eventide_core::command::Command;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_core::event::Event;
use serde::{Deserialize, Serialize};

use super::commands::{AddOrderNote, CreateOrder, ReserveInventory};
use super::events::{InventoryReserved, OrderCreated, OrderNoteAdded};

/// Aggregate type name of [`Order`].
pub const ORDER_TYPE: &str = "Order";
/// Aggregate type name of [`Inventory`].
pub const INVENTORY_TYPE: &str = "Inventory";

/// The aggregate root for an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    root: AggregateRoot,
    /// The ordered item, once the order exists.
    pub item: Option<String>,
    /// Internal notes in the order they were added.
    pub notes: Vec<String>,
}

impl Order {
    /// Creates an empty order at version 0.
    #[must_use]
    pub fn new(id: &str, type_name: &str) -> Self {
        Self {
            root: AggregateRoot::new(id, type_name),
            item: None,
            notes: Vec::new(),
        }
    }

    /// Places the order, producing an `OrderCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order already exists or the
    /// item is blank.
    pub fn create(&mut self, ctx: &Context, item: &str) -> Result<(), DomainError> {
        if self.item.is_some() {
            return Err(DomainError::Validation(format!(
                "order {} already exists",
                self.root.id()
            )));
        }
        if item.trim().is_empty() {
            return Err(DomainError::Validation("item must not be empty".to_owned()));
        }
        self.root.record(
            ctx,
            &OrderCreated {
                item: item.to_owned(),
            },
        )
    }

    /// Attaches a note, producing an `OrderNoteAdded` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the order does not exist yet.
    pub fn add_note(&mut self, ctx: &Context, note: &str) -> Result<(), DomainError> {
        if self.item.is_none() {
            return Err(DomainError::Validation(format!(
                "order {} not found",
                self.root.id()
            )));
        }
        self.root.record(
            ctx,
            &OrderNoteAdded {
                note: note.to_owned(),
            },
        )
    }
}

#[async_trait]
impl Aggregate for Order {
    fn root(&self) -> &AggregateRoot {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot {
        &mut self.root
    }

    fn apply_event(&mut self, event: &Event) -> Result<(), DomainError> {
        if event.is::<OrderCreated>() {
            let OrderCreated { item } = event.decode()?;
            self.item = Some(item);
        } else if event.is::<OrderNoteAdded>() {
            let OrderNoteAdded { note } = event.decode()?;
            self.notes.push(note);
        } else {
            return Err(DomainError::Validation(format!(
                "order cannot apply {}",
                event.event_type
            )));
        }
        Ok(())
    }

    async fn handle_command(&mut self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
        if let Some(create) = command.downcast_ref::<CreateOrder>() {
            return self.create(ctx, &create.item);
        }
        if let Some(add_note) = command.downcast_ref::<AddOrderNote>() {
            return self.add_note(ctx, &add_note.note);
        }
        Err(DomainError::UnexpectedCommand {
            aggregate_type: self.type_name().to_owned(),
            command: command.command_type(),
        })
    }
}

/// The aggregate root for the stock held against one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    root: AggregateRoot,
    /// The order the stock is reserved for.
    pub reserved_for: Option<String>,
}

impl Inventory {
    /// Creates an inventory stream with nothing reserved.
    #[must_use]
    pub fn new(id: &str, type_name: &str) -> Self {
        Self {
            root: AggregateRoot::new(id, type_name),
            reserved_for: None,
        }
    }

    /// Reserves stock, producing an `InventoryReserved` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if stock is already reserved.
    pub fn reserve(&mut self, ctx: &Context) -> Result<(), DomainError> {
        if let Some(order_id) = &self.reserved_for {
            return Err(DomainError::Validation(format!(
                "inventory already reserved for order {order_id}"
            )));
        }
        let order_id = self.root.id().to_owned();
        self.root.record(ctx, &InventoryReserved { order_id })
    }
}

#[async_trait]
impl Aggregate for Inventory {
    fn root(&self) -> &AggregateRoot {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot {
        &mut self.root
    }

    fn apply_event(&mut self, event: &Event) -> Result<(), DomainError> {
        let InventoryReserved { order_id } = event.decode()?;
        self.reserved_for = Some(order_id);
        Ok(())
    }

    async fn handle_command(&mut self, ctx: &Context, command: &dyn Command) -> Result<(), DomainError> {
        if command.is::<ReserveInventory>() {
            return self.reserve(ctx);
        }
        Err(DomainError::UnexpectedCommand {
            aggregate_type: self.type_name().to_owned(),
            command: command.command_type(),
        })
    }
}
