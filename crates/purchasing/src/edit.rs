//! One submitted edit of a purchase order's lines.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use shopdesk_catalog::ProductId;
use shopdesk_core::{Aggregate, DomainError, DomainResult};

use crate::order::{
    AddOrderItem, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId,
    PurchaseOrderItem, PurchaseOrderItemId, RemoveOrderItem, UpdateOrderItem,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineOutcome {
    /// The line after the change; `None` once removed.
    pub item: Option<PurchaseOrderItem>,
    pub events: Vec<PurchaseOrderEvent>,
}

/// Tracks the products touched while applying one submission to one order.
///
/// Lines of a pending order have no stock effect; stock only moves on delivery.
#[derive(Debug)]
pub struct PurchaseOrderEditBatch {
    order_id: PurchaseOrderId,
    seen: HashSet<ProductId>,
}

impl PurchaseOrderEditBatch {
    pub fn new(order_id: PurchaseOrderId) -> Self {
        Self {
            order_id,
            seen: HashSet::new(),
        }
    }

    pub fn order_id(&self) -> PurchaseOrderId {
        self.order_id
    }

    pub fn add_or_update_item(
        &mut self,
        order: &mut PurchaseOrder,
        product_id: ProductId,
        quantity: i64,
        purchase_price: Option<u64>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<OrderLineOutcome> {
        self.check(order, product_id)?;

        let command = if order.item_for(product_id).is_some() {
            PurchaseOrderCommand::UpdateOrderItem(UpdateOrderItem {
                order_id: self.order_id,
                product_id,
                quantity,
                purchase_price,
                occurred_at,
            })
        } else {
            PurchaseOrderCommand::AddOrderItem(AddOrderItem {
                order_id: self.order_id,
                item_id: PurchaseOrderItemId::generate(),
                product_id,
                quantity,
                purchase_price,
                occurred_at,
            })
        };
        let events = order.execute(&command)?;
        self.seen.insert(product_id);

        Ok(OrderLineOutcome {
            item: order.item_for(product_id).cloned(),
            events,
        })
    }

    pub fn remove_item(
        &mut self,
        order: &mut PurchaseOrder,
        product_id: ProductId,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<OrderLineOutcome> {
        self.check(order, product_id)?;

        let events = order.execute(&PurchaseOrderCommand::RemoveOrderItem(RemoveOrderItem {
            order_id: self.order_id,
            product_id,
            occurred_at,
        }))?;
        self.seen.insert(product_id);

        Ok(OrderLineOutcome { item: None, events })
    }

    fn check(&self, order: &PurchaseOrder, product_id: ProductId) -> DomainResult<()> {
        if order.id_typed() != self.order_id {
            return Err(DomainError::invariant("edit batch belongs to another order"));
        }
        // A delivered order reports that first, whatever the submission holds.
        if order.is_delivered() {
            return Err(DomainError::OrderAlreadyDelivered);
        }
        if self.seen.contains(&product_id) {
            return Err(DomainError::DuplicateProductInOrder(product_id.0));
        }
        Ok(())
    }
}
