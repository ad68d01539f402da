use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_catalog::ProductId;
use shopdesk_core::{Aggregate, AggregateRoot, DomainError};
use shopdesk_events::Event;

/// Why a product's quantity moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    SaleItemCreated,
    SaleItemUpdated,
    SaleItemDeleted,
    PurchaseOrderDelivered,
}

/// Aggregate root: StockLevel (one per product).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    product_id: ProductId,
    quantity: i64,
    version: u64,
    created: bool,
}

impl StockLevel {
    /// Create an empty, not-yet-opened level.
    pub fn empty(product_id: ProductId) -> Self {
        Self {
            product_id,
            quantity: 0,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a stored level.
    pub fn restore(product_id: ProductId, quantity: i64, version: u64) -> Self {
        Self {
            product_id,
            quantity,
            version,
            created: true,
        }
    }

    /// Open the level for a newly created product.
    pub fn open(
        product_id: ProductId,
        initial_quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> Result<(Self, StockOpened), DomainError> {
        let mut level = Self::empty(product_id);
        let events = level.execute(&StockCommand::OpenStock(OpenStock {
            product_id,
            initial_quantity,
            occurred_at,
        }))?;
        match events.into_iter().next() {
            Some(StockEvent::StockOpened(opened)) => Ok((level, opened)),
            _ => Err(DomainError::invariant("opening a stock level emitted no event")),
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Units currently on hand. Never negative.
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for StockLevel {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenStock (product creation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenStock {
    pub product_id: ProductId,
    pub initial_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DrawForSaleItem (a new sale line takes `quantity` units).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawForSaleItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResizeSaleItem (an existing sale line changes quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeSaleItem {
    pub product_id: ProductId,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestockFromSaleItem (a sale line is deleted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestockFromSaleItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveDelivery (a purchase order line is delivered).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveDelivery {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    OpenStock(OpenStock),
    DrawForSaleItem(DrawForSaleItem),
    ResizeSaleItem(ResizeSaleItem),
    RestockFromSaleItem(RestockFromSaleItem),
    ReceiveDelivery(ReceiveDelivery),
}

/// Event: StockOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOpened {
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a non-zero change of a product's on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub delta: i64,
    pub reason: StockReason,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    StockOpened(StockOpened),
    StockAdjusted(StockMovement),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockOpened(_) => "inventory.stock.opened",
            StockEvent::StockAdjusted(_) => "inventory.stock.adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::StockOpened(e) => e.occurred_at,
            StockEvent::StockAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockLevel {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::StockOpened(e) => {
                self.product_id = e.product_id;
                self.quantity = e.quantity;
                self.created = true;
            }
            StockEvent::StockAdjusted(e) => {
                self.quantity = self.quantity.saturating_add(e.delta);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::OpenStock(cmd) => self.handle_open(cmd),
            StockCommand::DrawForSaleItem(cmd) => self.handle_draw(cmd),
            StockCommand::ResizeSaleItem(cmd) => self.handle_resize(cmd),
            StockCommand::RestockFromSaleItem(cmd) => {
                self.ensure_open(cmd.product_id)?;
                ensure_line_quantity(cmd.quantity)?;
                self.ensure_room_for(cmd.quantity)?;
                Ok(self.movement(cmd.product_id, cmd.quantity, StockReason::SaleItemDeleted, cmd.occurred_at))
            }
            StockCommand::ReceiveDelivery(cmd) => {
                self.ensure_open(cmd.product_id)?;
                ensure_line_quantity(cmd.quantity)?;
                self.ensure_room_for(cmd.quantity)?;
                Ok(self.movement(
                    cmd.product_id,
                    cmd.quantity,
                    StockReason::PurchaseOrderDelivered,
                    cmd.occurred_at,
                ))
            }
        }
    }
}

fn ensure_line_quantity(quantity: i64) -> Result<(), DomainError> {
    if quantity < 1 {
        return Err(DomainError::validation(format!(
            "quantity must be at least 1 (got {quantity})"
        )));
    }
    Ok(())
}

impl StockLevel {
    fn ensure_open(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.product_id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    /// Rejects a credit the on-hand quantity cannot hold.
    fn ensure_room_for(&self, credit: i64) -> Result<(), DomainError> {
        if self.quantity.checked_add(credit).is_none() {
            return Err(DomainError::validation(format!(
                "adding {credit} to {} on hand exceeds the largest storable quantity",
                self.quantity
            )));
        }
        Ok(())
    }

    fn movement(
        &self,
        product_id: ProductId,
        delta: i64,
        reason: StockReason,
        occurred_at: DateTime<Utc>,
    ) -> Vec<StockEvent> {
        if delta == 0 {
            return vec![];
        }
        vec![StockEvent::StockAdjusted(StockMovement {
            product_id,
            delta,
            reason,
            occurred_at,
        })]
    }

    fn handle_open(&self, cmd: &OpenStock) -> Result<Vec<StockEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock level already exists"));
        }
        if cmd.initial_quantity < 0 {
            return Err(DomainError::validation("initial quantity cannot be negative"));
        }
        Ok(vec![StockEvent::StockOpened(StockOpened {
            product_id: cmd.product_id,
            quantity: cmd.initial_quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_draw(&self, cmd: &DrawForSaleItem) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_open(cmd.product_id)?;
        ensure_line_quantity(cmd.quantity)?;

        if cmd.quantity > self.quantity {
            return Err(DomainError::InsufficientStock {
                product: cmd.product_id.0,
                available: self.quantity,
                requested: cmd.quantity,
            });
        }

        Ok(self.movement(cmd.product_id, -cmd.quantity, StockReason::SaleItemCreated, cmd.occurred_at))
    }

    fn handle_resize(&self, cmd: &ResizeSaleItem) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_open(cmd.product_id)?;
        ensure_line_quantity(cmd.old_quantity)?;
        ensure_line_quantity(cmd.new_quantity)?;

        // Only the growth of the line has to be covered by what is on hand.
        if cmd.new_quantity - cmd.old_quantity > self.quantity {
            return Err(DomainError::InsufficientStock {
                product: cmd.product_id.0,
                available: self.quantity.saturating_add(cmd.old_quantity),
                requested: cmd.new_quantity,
            });
        }
        let delta = cmd.old_quantity - cmd.new_quantity;
        if delta > 0 {
            self.ensure_room_for(delta)?;
        }

        Ok(self.movement(
            cmd.product_id,
            delta,
            StockReason::SaleItemUpdated,
            cmd.occurred_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdesk_core::AggregateId;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn open_sets_initial_quantity() {
        let id = test_product_id();
        let (level, opened) = StockLevel::open(id, 10, test_time()).unwrap();
        assert_eq!(level.quantity(), 10);
        assert_eq!(opened.quantity, 10);
        assert_eq!(level.version(), 1);
    }

    #[test]
    fn open_rejects_negative_quantity() {
        let err = StockLevel::open(test_product_id(), -1, test_time()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn draw_rejects_zero_quantity() {
        let id = test_product_id();
        let level = StockLevel::restore(id, 5, 1);
        let err = level
            .handle(&StockCommand::DrawForSaleItem(DrawForSaleItem {
                product_id: id,
                quantity: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn commands_on_unopened_level_are_not_found() {
        let id = test_product_id();
        let err = StockLevel::empty(id)
            .handle(&StockCommand::ReceiveDelivery(ReceiveDelivery {
                product_id: id,
                quantity: 3,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let id = test_product_id();
        let level = StockLevel::restore(id, 5, 3);
        let before = level.clone();
        let _ = level.handle(&StockCommand::DrawForSaleItem(DrawForSaleItem {
            product_id: id,
            quantity: 2,
            occurred_at: test_time(),
        }));
        assert_eq!(level, before);
    }

    #[test]
    fn credits_past_the_storable_maximum_are_rejected() {
        let id = test_product_id();
        let level = StockLevel::restore(id, 1, 1);
        let before = level.clone();

        for command in [
            StockCommand::ReceiveDelivery(ReceiveDelivery {
                product_id: id,
                quantity: i64::MAX,
                occurred_at: test_time(),
            }),
            StockCommand::RestockFromSaleItem(RestockFromSaleItem {
                product_id: id,
                quantity: i64::MAX,
                occurred_at: test_time(),
            }),
        ] {
            let err = level.handle(&command).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
        assert_eq!(level, before);
    }

    #[test]
    fn shrinking_a_huge_line_onto_full_stock_is_rejected() {
        let id = test_product_id();
        let level = StockLevel::restore(id, i64::MAX - 1, 1);
        let err = level
            .handle(&StockCommand::ResizeSaleItem(ResizeSaleItem {
                product_id: id,
                old_quantity: 10,
                new_quantity: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn stock_event_types_are_namespaced() {
        let id = test_product_id();
        let e = StockEvent::StockAdjusted(StockMovement {
            product_id: id,
            delta: -1,
            reason: StockReason::SaleItemCreated,
            occurred_at: test_time(),
        });
        assert_eq!(e.event_type(), "inventory.stock.adjusted");
    }
}
