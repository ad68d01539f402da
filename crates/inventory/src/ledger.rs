//! Stock ledger: the four ways a product's quantity may move.

use chrono::{DateTime, Utc};

use shopdesk_core::{Aggregate, DomainResult};

use crate::stock::{
    DrawForSaleItem, ReceiveDelivery, ResizeSaleItem, RestockFromSaleItem, StockCommand,
    StockEvent, StockLevel, StockMovement,
};

/// Entry points used by the sale and purchase-order workflows.
///
/// Each operation decides against the level it is given, applies the resulting
/// movement and returns it. `None` means the quantity did not move. On error the
/// level is left untouched.
pub struct StockLedger;

impl StockLedger {
    /// A new sale line takes `quantity` units.
    ///
    /// Fails with `InsufficientStock { available: on_hand }` when the line asks
    /// for more than is on hand.
    pub fn apply_sale_item_create(
        level: &mut StockLevel,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Option<StockMovement>> {
        let product_id = level.product_id();
        run(
            level,
            StockCommand::DrawForSaleItem(DrawForSaleItem {
                product_id,
                quantity,
                occurred_at,
            }),
        )
    }

    /// An existing sale line goes from `old_quantity` to `new_quantity`.
    ///
    /// The units already held by the line count as available, so the ceiling
    /// reported on failure is `on_hand + old_quantity`.
    pub fn apply_sale_item_update(
        level: &mut StockLevel,
        old_quantity: i64,
        new_quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Option<StockMovement>> {
        let product_id = level.product_id();
        run(
            level,
            StockCommand::ResizeSaleItem(ResizeSaleItem {
                product_id,
                old_quantity,
                new_quantity,
                occurred_at,
            }),
        )
    }

    /// A sale line is deleted; its units return to stock.
    pub fn apply_sale_item_delete(
        level: &mut StockLevel,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Option<StockMovement>> {
        let product_id = level.product_id();
        run(
            level,
            StockCommand::RestockFromSaleItem(RestockFromSaleItem {
                product_id,
                quantity,
                occurred_at,
            }),
        )
    }

    /// A purchase order line is received as part of the order's delivery.
    pub fn apply_purchase_order_item_delivered(
        level: &mut StockLevel,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<Option<StockMovement>> {
        let product_id = level.product_id();
        run(
            level,
            StockCommand::ReceiveDelivery(ReceiveDelivery {
                product_id,
                quantity,
                occurred_at,
            }),
        )
    }
}

fn run(level: &mut StockLevel, command: StockCommand) -> DomainResult<Option<StockMovement>> {
    let events = level.execute(&command)?;
    Ok(events.into_iter().find_map(|e| match e {
        StockEvent::StockAdjusted(m) => Some(m),
        StockEvent::StockOpened(_) => None,
    }))
}
