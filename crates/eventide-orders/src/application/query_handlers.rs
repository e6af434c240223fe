//! Query handlers for the Orders & Inventory context.
//!
//! Queries rebuild aggregates from the store through an
//! [`AggregateReader`] and return read-only view DTOs.

use eventide_core::aggregate::Aggregate as _;
use eventide_core::context::Context;
use eventide_core::error::DomainError;
use eventide_runtime::AggregateReader;
use serde::Serialize;

use crate::domain::aggregates::{Inventory, Order};

/// Read-only view of an order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    /// The order identifier.
    pub order_id: String,
    /// The ordered item.
    pub item: String,
    /// Internal notes, oldest first.
    pub notes: Vec<String>,
    /// Whether stock is reserved for the order.
    pub reserved: bool,
    /// Version of the order stream.
    pub version: i64,
}

/// Retrieves an order together with its reservation state.
///
/// Returns `Ok(None)` if no order with this id has been created.
///
/// # Errors
///
/// Returns `DomainError` if either stream cannot be loaded or replayed.
pub async fn get_order_by_id(
    ctx: &Context,
    orders: &AggregateReader<Order>,
    inventory: &AggregateReader<Inventory>,
    order_id: &str,
) -> Result<Option<OrderView>, DomainError> {
    let order = orders.load(ctx, order_id).await?;
    let Some(item) = order.item.clone() else {
        return Ok(None);
    };
    let stock = inventory.load(ctx, order_id).await?;
    Ok(Some(OrderView {
        order_id: order_id.to_owned(),
        item,
        notes: order.notes.clone(),
        reserved: stock.reserved_for.is_some(),
        version: order.version(),
    }))
}
