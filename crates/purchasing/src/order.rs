use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_catalog::ProductId;
use shopdesk_core::{Aggregate, AggregateRoot, DomainError, Entity};
use shopdesk_events::Event;
use shopdesk_parties::SupplierId;

shopdesk_core::typed_id!(
    /// Purchase order identifier.
    PurchaseOrderId
);

shopdesk_core::typed_id!(
    /// Purchase order line identifier.
    PurchaseOrderItemId
);

/// Purchase order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: PurchaseOrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Unit price paid to the supplier, when known.
    pub purchase_price: Option<u64>,
}

impl PurchaseOrderItem {
    /// Missing prices count as zero.
    pub fn line_total(&self) -> u64 {
        self.purchase_price
            .unwrap_or(0)
            .saturating_mul(u64::try_from(self.quantity).unwrap_or(0))
    }
}

impl Entity for PurchaseOrderItem {
    type Id = PurchaseOrderItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    supplier_id: Option<SupplierId>,
    order_date: DateTime<Utc>,
    delivery_date: Option<DateTime<Utc>>,
    items: Vec<PurchaseOrderItem>,
    discarded: bool,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            supplier_id: None,
            order_date: DateTime::<Utc>::default(),
            delivery_date: None,
            items: Vec::new(),
            discarded: false,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a stored order.
    pub fn restore(
        id: PurchaseOrderId,
        supplier_id: Option<SupplierId>,
        order_date: DateTime<Utc>,
        delivery_date: Option<DateTime<Utc>>,
        items: Vec<PurchaseOrderItem>,
        version: u64,
    ) -> Self {
        Self {
            id,
            supplier_id,
            order_date,
            delivery_date,
            items,
            discarded: false,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn order_date(&self) -> DateTime<Utc> {
        self.order_date
    }

    /// `None` while pending.
    pub fn delivery_date(&self) -> Option<DateTime<Utc>> {
        self.delivery_date
    }

    pub fn is_delivered(&self) -> bool {
        self.delivery_date.is_some()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn items(&self) -> &[PurchaseOrderItem] {
        &self.items
    }

    pub fn item_for(&self, product_id: ProductId) -> Option<&PurchaseOrderItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn total(&self) -> u64 {
        self.items
            .iter()
            .fold(0u64, |acc, i| acc.saturating_add(i.line_total()))
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub order_id: PurchaseOrderId,
    pub supplier_id: Option<SupplierId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOrderItem {
    pub order_id: PurchaseOrderId,
    pub item_id: PurchaseOrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub purchase_price: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderItem {
    pub order_id: PurchaseOrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub purchase_price: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOrderItem {
    pub order_id: PurchaseOrderId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignSupplier {
    pub order_id: PurchaseOrderId,
    pub supplier_id: Option<SupplierId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeliverOrder. `occurred_at` becomes the delivery date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DetachSupplier. The supplier is being deleted; allowed on
/// delivered orders too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachSupplier {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DiscardOrder (delete a pending order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscardOrder {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddOrderItem(AddOrderItem),
    UpdateOrderItem(UpdateOrderItem),
    RemoveOrderItem(RemoveOrderItem),
    AssignSupplier(AssignSupplier),
    DetachSupplier(DetachSupplier),
    DeliverOrder(DeliverOrder),
    DiscardOrder(DiscardOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub order_id: PurchaseOrderId,
    pub supplier_id: Option<SupplierId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemAdded {
    pub order_id: PurchaseOrderId,
    pub item: PurchaseOrderItem,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemUpdated {
    pub order_id: PurchaseOrderId,
    pub item_id: PurchaseOrderItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub purchase_price: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRemoved {
    pub order_id: PurchaseOrderId,
    pub item_id: PurchaseOrderItemId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierAssigned {
    pub order_id: PurchaseOrderId,
    pub supplier_id: Option<SupplierId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierDetached {
    pub order_id: PurchaseOrderId,
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderDelivered. Carries the received lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDelivered {
    pub order_id: PurchaseOrderId,
    pub lines: Vec<PurchaseOrderItem>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDiscarded {
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    OrderItemAdded(OrderItemAdded),
    OrderItemUpdated(OrderItemUpdated),
    OrderItemRemoved(OrderItemRemoved),
    SupplierAssigned(SupplierAssigned),
    SupplierDetached(SupplierDetached),
    OrderDelivered(OrderDelivered),
    OrderDiscarded(OrderDiscarded),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.purchase_order.created",
            PurchaseOrderEvent::OrderItemAdded(_) => "purchasing.purchase_order.item_added",
            PurchaseOrderEvent::OrderItemUpdated(_) => "purchasing.purchase_order.item_updated",
            PurchaseOrderEvent::OrderItemRemoved(_) => "purchasing.purchase_order.item_removed",
            PurchaseOrderEvent::SupplierAssigned(_) => "purchasing.purchase_order.supplier_assigned",
            PurchaseOrderEvent::SupplierDetached(_) => "purchasing.purchase_order.supplier_detached",
            PurchaseOrderEvent::OrderDelivered(_) => "purchasing.purchase_order.delivered",
            PurchaseOrderEvent::OrderDiscarded(_) => "purchasing.purchase_order.discarded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::OrderItemAdded(e) => e.occurred_at,
            PurchaseOrderEvent::OrderItemUpdated(e) => e.occurred_at,
            PurchaseOrderEvent::OrderItemRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::SupplierAssigned(e) => e.occurred_at,
            PurchaseOrderEvent::SupplierDetached(e) => e.occurred_at,
            PurchaseOrderEvent::OrderDelivered(e) => e.occurred_at,
            PurchaseOrderEvent::OrderDiscarded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.supplier_id = e.supplier_id;
                self.order_date = e.occurred_at;
                self.delivery_date = None;
                self.items.clear();
                self.created = true;
            }
            PurchaseOrderEvent::OrderItemAdded(e) => {
                self.items.push(e.item.clone());
            }
            PurchaseOrderEvent::OrderItemUpdated(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == e.item_id) {
                    item.quantity = e.quantity;
                    item.purchase_price = e.purchase_price;
                }
            }
            PurchaseOrderEvent::OrderItemRemoved(e) => {
                self.items.retain(|i| i.id != e.item_id);
            }
            PurchaseOrderEvent::SupplierAssigned(e) => {
                self.supplier_id = e.supplier_id;
            }
            PurchaseOrderEvent::SupplierDetached(_) => {
                self.supplier_id = None;
            }
            PurchaseOrderEvent::OrderDelivered(e) => {
                self.delivery_date = Some(e.occurred_at);
            }
            PurchaseOrderEvent::OrderDiscarded(_) => {
                self.discarded = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddOrderItem(cmd) => self.handle_add_item(cmd),
            PurchaseOrderCommand::UpdateOrderItem(cmd) => self.handle_update_item(cmd),
            PurchaseOrderCommand::RemoveOrderItem(cmd) => self.handle_remove_item(cmd),
            PurchaseOrderCommand::AssignSupplier(cmd) => self.handle_assign_supplier(cmd),
            PurchaseOrderCommand::DetachSupplier(cmd) => self.handle_detach_supplier(cmd),
            PurchaseOrderCommand::DeliverOrder(cmd) => self.handle_deliver(cmd),
            PurchaseOrderCommand::DiscardOrder(cmd) => self.handle_discard(cmd),
        }
    }
}

fn ensure_quantity(quantity: i64) -> Result<(), DomainError> {
    if quantity < 1 {
        return Err(DomainError::validation("quantity must be greater than 0"));
    }
    Ok(())
}

impl PurchaseOrder {
    fn ensure_existing(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if !self.created || self.discarded {
            return Err(DomainError::not_found());
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_pending(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        self.ensure_existing(order_id)?;
        if self.is_delivered() {
            return Err(DomainError::OrderAlreadyDelivered);
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(PurchaseOrderCreated {
            order_id: cmd.order_id,
            supplier_id: cmd.supplier_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddOrderItem) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_pending(cmd.order_id)?;
        ensure_quantity(cmd.quantity)?;

        if self.item_for(cmd.product_id).is_some() {
            return Err(DomainError::DuplicateProductInOrder(cmd.product_id.0));
        }

        Ok(vec![PurchaseOrderEvent::OrderItemAdded(OrderItemAdded {
            order_id: cmd.order_id,
            item: PurchaseOrderItem {
                id: cmd.item_id,
                product_id: cmd.product_id,
                quantity: cmd.quantity,
                purchase_price: cmd.purchase_price,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(&self, cmd: &UpdateOrderItem) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_pending(cmd.order_id)?;
        ensure_quantity(cmd.quantity)?;

        let Some(item) = self.item_for(cmd.product_id) else {
            return Err(DomainError::not_found());
        };
        if item.quantity == cmd.quantity && item.purchase_price == cmd.purchase_price {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseOrderEvent::OrderItemUpdated(OrderItemUpdated {
            order_id: cmd.order_id,
            item_id: item.id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            purchase_price: cmd.purchase_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveOrderItem) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_pending(cmd.order_id)?;

        let Some(item) = self.item_for(cmd.product_id) else {
            return Err(DomainError::not_found());
        };

        Ok(vec![PurchaseOrderEvent::OrderItemRemoved(OrderItemRemoved {
            order_id: cmd.order_id,
            item_id: item.id,
            product_id: item.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_detach_supplier(&self, cmd: &DetachSupplier) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        let Some(supplier_id) = self.supplier_id else {
            return Ok(vec![]);
        };

        Ok(vec![PurchaseOrderEvent::SupplierDetached(SupplierDetached {
            order_id: cmd.order_id,
            supplier_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_supplier(&self, cmd: &AssignSupplier) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_pending(cmd.order_id)?;
        if self.supplier_id == cmd.supplier_id {
            return Ok(vec![]);
        }

        Ok(vec![PurchaseOrderEvent::SupplierAssigned(SupplierAssigned {
            order_id: cmd.order_id,
            supplier_id: cmd.supplier_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deliver(&self, cmd: &DeliverOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.order_id)?;
        if self.is_delivered() {
            return Err(DomainError::AlreadyDelivered);
        }
        if self.items.is_empty() {
            return Err(DomainError::validation("cannot deliver an order without items"));
        }

        Ok(vec![PurchaseOrderEvent::OrderDelivered(OrderDelivered {
            order_id: cmd.order_id,
            lines: self.items.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_discard(&self, cmd: &DiscardOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_pending(cmd.order_id)?;

        Ok(vec![PurchaseOrderEvent::OrderDiscarded(OrderDiscarded {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdesk_core::AggregateId;

    fn test_order_id() -> PurchaseOrderId {
        PurchaseOrderId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created(id: PurchaseOrderId) -> PurchaseOrder {
        let mut order = PurchaseOrder::empty(id);
        order
            .execute(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id: id,
                supplier_id: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        order
    }

    fn add(order_id: PurchaseOrderId, product_id: ProductId, quantity: i64) -> PurchaseOrderCommand {
        PurchaseOrderCommand::AddOrderItem(AddOrderItem {
            order_id,
            item_id: PurchaseOrderItemId::generate(),
            product_id,
            quantity,
            purchase_price: Some(700),
            occurred_at: test_time(),
        })
    }

    fn deliver(order_id: PurchaseOrderId) -> PurchaseOrderCommand {
        PurchaseOrderCommand::DeliverOrder(DeliverOrder {
            order_id,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn new_order_is_pending() {
        let order = created(test_order_id());
        assert!(!order.is_delivered());
        assert_eq!(order.delivery_date(), None);
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn deliver_sets_delivery_date_and_freezes_items() {
        let id = test_order_id();
        let mut order = created(id);
        order.execute(&add(id, test_product_id(), 5)).unwrap();

        let events = order.execute(&deliver(id)).unwrap();
        match &events[0] {
            PurchaseOrderEvent::OrderDelivered(e) => assert_eq!(e.lines.len(), 1),
            _ => panic!("Expected OrderDelivered event"),
        }
        assert!(order.delivery_date().is_some());

        let err = order.handle(&add(id, test_product_id(), 1)).unwrap_err();
        assert_eq!(err, DomainError::OrderAlreadyDelivered);
    }

    #[test]
    fn deliver_twice_is_already_delivered() {
        let id = test_order_id();
        let mut order = created(id);
        order.execute(&add(id, test_product_id(), 5)).unwrap();
        order.execute(&deliver(id)).unwrap();

        let err = order.handle(&deliver(id)).unwrap_err();
        assert_eq!(err, DomainError::AlreadyDelivered);
    }

    #[test]
    fn deliver_empty_order_is_rejected() {
        let id = test_order_id();
        let order = created(id);
        let err = order.handle(&deliver(id)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn total_counts_missing_prices_as_zero() {
        let id = test_order_id();
        let mut order = created(id);
        order.execute(&add(id, test_product_id(), 2)).unwrap();
        order
            .execute(&PurchaseOrderCommand::AddOrderItem(AddOrderItem {
                order_id: id,
                item_id: PurchaseOrderItemId::generate(),
                product_id: test_product_id(),
                quantity: 4,
                purchase_price: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert_eq!(order.total(), 1_400);
    }

    #[test]
    fn discard_only_pending_orders() {
        let id = test_order_id();
        let mut order = created(id);
        order.execute(&add(id, test_product_id(), 1)).unwrap();
        order.execute(&deliver(id)).unwrap();

        let err = order
            .handle(&PurchaseOrderCommand::DiscardOrder(DiscardOrder {
                order_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::OrderAlreadyDelivered);

        let pending_id = test_order_id();
        let mut pending = created(pending_id);
        pending
            .execute(&PurchaseOrderCommand::DiscardOrder(DiscardOrder {
                order_id: pending_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(pending.is_discarded());
        assert_eq!(pending.handle(&add(pending_id, test_product_id(), 1)).unwrap_err(), DomainError::NotFound);
    }

    #[test]
    fn a_delivered_order_still_lets_go_of_its_supplier() {
        let id = test_order_id();
        let supplier_id = SupplierId::new(AggregateId::new());
        let mut order = PurchaseOrder::empty(id);
        order
            .execute(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                order_id: id,
                supplier_id: Some(supplier_id),
                occurred_at: test_time(),
            }))
            .unwrap();
        order.execute(&add(id, test_product_id(), 1)).unwrap();
        order.execute(&deliver(id)).unwrap();
        let detach = PurchaseOrderCommand::DetachSupplier(DetachSupplier {
            order_id: id,
            occurred_at: test_time(),
        });

        let events = order.execute(&detach).unwrap();

        assert!(matches!(&events[0], PurchaseOrderEvent::SupplierDetached(e) if e.supplier_id == supplier_id));
        assert_eq!(order.supplier_id(), None);
        assert!(order.is_delivered());
        assert!(order.handle(&detach).unwrap().is_empty());
    }
}
