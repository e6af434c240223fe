//! Registers the context's events, aggregates, saga and projection on an
//! engine builder.

use std::sync::Arc;

use eventide_runtime::{AggregateReader, Engine, EngineBuilder};

use crate::application::projection::OrderSummaryProjection;
use crate::application::saga::ReservationSaga;
use crate::domain::aggregates::{INVENTORY_TYPE, Inventory, ORDER_TYPE, Order};
use crate::domain::commands::{AddOrderNote, CreateOrder, ReserveInventory};
use crate::domain::events::{InventoryReserved, OrderCreated, OrderNoteAdded};

/// Registers the context's event types. Notes are local-only.
pub fn register_events(builder: &mut EngineBuilder) {
    builder
        .register_event::<OrderCreated>(false)
        .register_event::<OrderNoteAdded>(true)
        .register_event::<InventoryReserved>(false);
}

/// Wires the whole context: events, both aggregates with their commands,
/// the summary projection and then the reservation saga.
pub fn wire(builder: &mut EngineBuilder, projection: Arc<OrderSummaryProjection>) {
    register_events(builder);
    builder
        .wire_aggregate(ORDER_TYPE, Order::new)
        .command::<CreateOrder>()
        .command::<AddOrderNote>();
    builder
        .wire_aggregate(INVENTORY_TYPE, Inventory::new)
        .command::<ReserveInventory>();
    builder
        .wire_event_handler(projection)
        .wire_saga(Arc::new(ReservationSaga), ReservationSaga::matcher());
}

/// Returns a reader for order streams.
#[must_use]
pub fn order_reader(engine: &Engine) -> AggregateReader<Order> {
    engine.reader(ORDER_TYPE, Order::new)
}

/// Returns a reader for inventory streams.
#[must_use]
pub fn inventory_reader(engine: &Engine) -> AggregateReader<Inventory> {
    engine.reader(INVENTORY_TYPE, Inventory::new)
}
