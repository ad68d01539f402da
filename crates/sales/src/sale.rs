use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_catalog::ProductId;
use shopdesk_core::{Aggregate, AggregateRoot, DomainError, Entity};
use shopdesk_events::Event;
use shopdesk_parties::ClientId;

shopdesk_core::typed_id!(
    /// Sale identifier.
    SaleId
);

shopdesk_core::typed_id!(
    /// Sale line identifier.
    SaleItemId
);

/// Sale line: product, quantity, agreed unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: SaleItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    /// Price in smallest currency unit.
    pub sale_price: u64,
}

impl SaleItem {
    pub fn line_total(&self) -> u64 {
        self.sale_price
            .saturating_mul(u64::try_from(self.quantity).unwrap_or(0))
    }
}

impl Entity for SaleItem {
    type Id = SaleItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Aggregate root: Sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sale {
    id: SaleId,
    client_id: Option<ClientId>,
    sale_date: DateTime<Utc>,
    items: Vec<SaleItem>,
    canceled: bool,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            client_id: None,
            sale_date: DateTime::<Utc>::default(),
            items: Vec::new(),
            canceled: false,
            version: 0,
            created: false,
        }
    }

    /// Rebuild a stored sale.
    pub fn restore(
        id: SaleId,
        client_id: Option<ClientId>,
        sale_date: DateTime<Utc>,
        items: Vec<SaleItem>,
        version: u64,
    ) -> Self {
        Self {
            id,
            client_id,
            sale_date,
            items,
            canceled: false,
            version,
            created: true,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// Set once at creation, never edited.
    pub fn sale_date(&self) -> DateTime<Utc> {
        self.sale_date
    }

    pub fn items(&self) -> &[SaleItem] {
        &self.items
    }

    pub fn item_for(&self, product_id: ProductId) -> Option<&SaleItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Σ quantity × sale_price over all lines.
    pub fn total(&self) -> u64 {
        self.items
            .iter()
            .fold(0u64, |acc, i| acc.saturating_add(i.line_total()))
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateSale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSale {
    pub sale_id: SaleId,
    pub client_id: Option<ClientId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem. The caller states whether the product is currently listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub sale_id: SaleId,
    pub item_id: SaleItemId,
    pub product_id: ProductId,
    pub product_sellable: bool,
    pub quantity: i64,
    pub sale_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItem (quantity and/or price of the product's line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub sale_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignClient (`None` detaches the client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignClient {
    pub sale_id: SaleId,
    pub client_id: Option<ClientId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelSale. Removes every line, then the sale itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSale {
    pub sale_id: SaleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleCommand {
    CreateSale(CreateSale),
    AddItem(AddItem),
    UpdateItem(UpdateItem),
    RemoveItem(RemoveItem),
    AssignClient(AssignClient),
    CancelSale(CancelSale),
}

/// Event: SaleCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCreated {
    pub sale_id: SaleId,
    pub client_id: Option<ClientId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItemAdded {
    pub sale_id: SaleId,
    pub item: SaleItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleItemUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItemUpdated {
    pub sale_id: SaleId,
    pub item_id: SaleItemId,
    pub product_id: ProductId,
    pub old_quantity: i64,
    pub new_quantity: i64,
    pub sale_price: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItemRemoved {
    pub sale_id: SaleId,
    pub item_id: SaleItemId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientAssigned {
    pub sale_id: SaleId,
    pub client_id: Option<ClientId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleCanceled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCanceled {
    pub sale_id: SaleId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleCreated(SaleCreated),
    SaleItemAdded(SaleItemAdded),
    SaleItemUpdated(SaleItemUpdated),
    SaleItemRemoved(SaleItemRemoved),
    ClientAssigned(ClientAssigned),
    SaleCanceled(SaleCanceled),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleCreated(_) => "sales.sale.created",
            SaleEvent::SaleItemAdded(_) => "sales.sale.item_added",
            SaleEvent::SaleItemUpdated(_) => "sales.sale.item_updated",
            SaleEvent::SaleItemRemoved(_) => "sales.sale.item_removed",
            SaleEvent::ClientAssigned(_) => "sales.sale.client_assigned",
            SaleEvent::SaleCanceled(_) => "sales.sale.canceled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleCreated(e) => e.occurred_at,
            SaleEvent::SaleItemAdded(e) => e.occurred_at,
            SaleEvent::SaleItemUpdated(e) => e.occurred_at,
            SaleEvent::SaleItemRemoved(e) => e.occurred_at,
            SaleEvent::ClientAssigned(e) => e.occurred_at,
            SaleEvent::SaleCanceled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleCreated(e) => {
                self.id = e.sale_id;
                self.client_id = e.client_id;
                self.sale_date = e.occurred_at;
                self.items.clear();
                self.created = true;
            }
            SaleEvent::SaleItemAdded(e) => {
                self.items.push(e.item.clone());
            }
            SaleEvent::SaleItemUpdated(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == e.item_id) {
                    item.quantity = e.new_quantity;
                    item.sale_price = e.sale_price;
                }
            }
            SaleEvent::SaleItemRemoved(e) => {
                self.items.retain(|i| i.id != e.item_id);
            }
            SaleEvent::ClientAssigned(e) => {
                self.client_id = e.client_id;
            }
            SaleEvent::SaleCanceled(_) => {
                self.items.clear();
                self.canceled = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::CreateSale(cmd) => self.handle_create(cmd),
            SaleCommand::AddItem(cmd) => self.handle_add_item(cmd),
            SaleCommand::UpdateItem(cmd) => self.handle_update_item(cmd),
            SaleCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            SaleCommand::AssignClient(cmd) => self.handle_assign_client(cmd),
            SaleCommand::CancelSale(cmd) => self.handle_cancel(cmd),
        }
    }
}

fn ensure_quantity(quantity: i64) -> Result<(), DomainError> {
    if quantity < 1 {
        return Err(DomainError::validation("quantity must be greater than 0"));
    }
    Ok(())
}

impl Sale {
    fn ensure_editable(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        if self.canceled {
            return Err(DomainError::invariant("sale has been canceled"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }

        Ok(vec![SaleEvent::SaleCreated(SaleCreated {
            sale_id: cmd.sale_id,
            client_id: cmd.client_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_editable(cmd.sale_id)?;
        ensure_quantity(cmd.quantity)?;

        if self.item_for(cmd.product_id).is_some() {
            return Err(DomainError::DuplicateProductInSale(cmd.product_id.0));
        }
        if !cmd.product_sellable {
            return Err(DomainError::validation(format!(
                "product {} is not for sale",
                cmd.product_id
            )));
        }

        Ok(vec![SaleEvent::SaleItemAdded(SaleItemAdded {
            sale_id: cmd.sale_id,
            item: SaleItem {
                id: cmd.item_id,
                product_id: cmd.product_id,
                quantity: cmd.quantity,
                sale_price: cmd.sale_price,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(&self, cmd: &UpdateItem) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_editable(cmd.sale_id)?;
        ensure_quantity(cmd.quantity)?;

        let Some(item) = self.item_for(cmd.product_id) else {
            return Err(DomainError::not_found());
        };
        if item.quantity == cmd.quantity && item.sale_price == cmd.sale_price {
            return Ok(vec![]);
        }

        Ok(vec![SaleEvent::SaleItemUpdated(SaleItemUpdated {
            sale_id: cmd.sale_id,
            item_id: item.id,
            product_id: cmd.product_id,
            old_quantity: item.quantity,
            new_quantity: cmd.quantity,
            sale_price: cmd.sale_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveItem) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_editable(cmd.sale_id)?;

        let Some(item) = self.item_for(cmd.product_id) else {
            return Err(DomainError::not_found());
        };

        Ok(vec![SaleEvent::SaleItemRemoved(SaleItemRemoved {
            sale_id: cmd.sale_id,
            item_id: item.id,
            product_id: item.product_id,
            quantity: item.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_client(&self, cmd: &AssignClient) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_editable(cmd.sale_id)?;
        if self.client_id == cmd.client_id {
            return Ok(vec![]);
        }

        Ok(vec![SaleEvent::ClientAssigned(ClientAssigned {
            sale_id: cmd.sale_id,
            client_id: cmd.client_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelSale) -> Result<Vec<SaleEvent>, DomainError> {
        self.ensure_editable(cmd.sale_id)?;

        let mut events: Vec<SaleEvent> = self
            .items
            .iter()
            .map(|item| {
                SaleEvent::SaleItemRemoved(SaleItemRemoved {
                    sale_id: cmd.sale_id,
                    item_id: item.id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    occurred_at: cmd.occurred_at,
                })
            })
            .collect();
        events.push(SaleEvent::SaleCanceled(SaleCanceled {
            sale_id: cmd.sale_id,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }
}
