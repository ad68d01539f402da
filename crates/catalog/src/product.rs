use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopdesk_core::{Aggregate, AggregateRoot, DomainError};
use shopdesk_events::Event;
use shopdesk_parties::SupplierId;

use crate::category::CategoryId;

shopdesk_core::typed_id!(
    /// Product identifier.
    ProductId
);

/// Description stored when none is given at creation.
pub const DEFAULT_DESCRIPTION: &str = "No description";

/// Product status: whether the product may appear on new sale lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    ForSale,
    InRepair,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::ForSale => "for_sale",
            ProductStatus::InRepair => "in_repair",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "for_sale" => Some(ProductStatus::ForSale),
            "in_repair" => Some(ProductStatus::InRepair),
            _ => None,
        }
    }
}

/// Flat, storable form of a [`Product`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    pub description: String,
    pub initial_selling_price: u64,
    pub suppliers: BTreeSet<SupplierId>,
    pub status: ProductStatus,
    pub version: u64,
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    category_id: Option<CategoryId>,
    description: String,
    initial_selling_price: u64,
    suppliers: BTreeSet<SupplierId>,
    status: ProductStatus,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            category_id: None,
            description: String::new(),
            initial_selling_price: 0,
            suppliers: BTreeSet::new(),
            status: ProductStatus::ForSale,
            version: 0,
            created: false,
        }
    }

    pub fn from_record(record: ProductRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            category_id: Some(record.category_id),
            description: record.description,
            initial_selling_price: record.initial_selling_price,
            suppliers: record.suppliers,
            status: record.status,
            version: record.version,
            created: true,
        }
    }

    /// Storable form; `None` until the product has been created.
    pub fn to_record(&self) -> Option<ProductRecord> {
        let category_id = self.category_id.filter(|_| self.created)?;
        Some(ProductRecord {
            id: self.id,
            name: self.name.clone(),
            category_id,
            description: self.description.clone(),
            initial_selling_price: self.initial_selling_price,
            suppliers: self.suppliers.clone(),
            status: self.status,
            version: self.version,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category_id(&self) -> Option<CategoryId> {
        self.category_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn initial_selling_price(&self) -> u64 {
        self.initial_selling_price
    }

    pub fn suppliers(&self) -> &BTreeSet<SupplierId> {
        &self.suppliers
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Whether the product may be put on a *new* sale line.
    ///
    /// Existing lines stay editable after a product leaves the listing.
    pub fn is_sellable(&self) -> bool {
        self.created && self.status == ProductStatus::ForSale
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Products offered on new sale lines, in the given order.
pub fn sellable<'a>(products: impl IntoIterator<Item = &'a Product>) -> impl Iterator<Item = &'a Product> {
    products.into_iter().filter(|p| p.is_sellable())
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    pub description: Option<String>,
    pub initial_selling_price: u64,
    pub suppliers: Vec<SupplierId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails. `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub category_id: Option<CategoryId>,
    pub description: Option<String>,
    pub initial_selling_price: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSupplier {
    pub product_id: ProductId,
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlinkSupplier {
    pub product_id: ProductId,
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkProductInRepair {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkProductForSale {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductDetails(UpdateProductDetails),
    LinkSupplier(LinkSupplier),
    UnlinkSupplier(UnlinkSupplier),
    MarkProductInRepair(MarkProductInRepair),
    MarkProductForSale(MarkProductForSale),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    pub description: String,
    pub initial_selling_price: u64,
    pub suppliers: BTreeSet<SupplierId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDetailsUpdated (new values of the descriptive fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetailsUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub category_id: CategoryId,
    pub description: String,
    pub initial_selling_price: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierLinked {
    pub product_id: ProductId,
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierUnlinked {
    pub product_id: ProductId,
    pub supplier_id: SupplierId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMarkedInRepair {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMarkedForSale {
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductDetailsUpdated(ProductDetailsUpdated),
    SupplierLinked(SupplierLinked),
    SupplierUnlinked(SupplierUnlinked),
    ProductMarkedInRepair(ProductMarkedInRepair),
    ProductMarkedForSale(ProductMarkedForSale),
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "catalog.product.created",
            ProductEvent::ProductDetailsUpdated(_) => "catalog.product.details_updated",
            ProductEvent::SupplierLinked(_) => "catalog.product.supplier_linked",
            ProductEvent::SupplierUnlinked(_) => "catalog.product.supplier_unlinked",
            ProductEvent::ProductMarkedInRepair(_) => "catalog.product.marked_in_repair",
            ProductEvent::ProductMarkedForSale(_) => "catalog.product.marked_for_sale",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductDetailsUpdated(e) => e.occurred_at,
            ProductEvent::SupplierLinked(e) => e.occurred_at,
            ProductEvent::SupplierUnlinked(e) => e.occurred_at,
            ProductEvent::ProductMarkedInRepair(e) => e.occurred_at,
            ProductEvent::ProductMarkedForSale(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.category_id = Some(e.category_id);
                self.description = e.description.clone();
                self.initial_selling_price = e.initial_selling_price;
                self.suppliers = e.suppliers.clone();
                self.status = ProductStatus::ForSale;
                self.created = true;
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                self.name = e.name.clone();
                self.category_id = Some(e.category_id);
                self.description = e.description.clone();
                self.initial_selling_price = e.initial_selling_price;
            }
            ProductEvent::SupplierLinked(e) => {
                self.suppliers.insert(e.supplier_id);
            }
            ProductEvent::SupplierUnlinked(e) => {
                self.suppliers.remove(&e.supplier_id);
            }
            ProductEvent::ProductMarkedInRepair(_) => {
                self.status = ProductStatus::InRepair;
            }
            ProductEvent::ProductMarkedForSale(_) => {
                self.status = ProductStatus::ForSale;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProductDetails(cmd) => self.handle_update(cmd),
            ProductCommand::LinkSupplier(cmd) => {
                self.ensure_existing(cmd.product_id)?;
                if self.suppliers.contains(&cmd.supplier_id) {
                    return Ok(vec![]);
                }
                Ok(vec![ProductEvent::SupplierLinked(SupplierLinked {
                    product_id: cmd.product_id,
                    supplier_id: cmd.supplier_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::UnlinkSupplier(cmd) => {
                self.ensure_existing(cmd.product_id)?;
                if !self.suppliers.contains(&cmd.supplier_id) {
                    return Ok(vec![]);
                }
                Ok(vec![ProductEvent::SupplierUnlinked(SupplierUnlinked {
                    product_id: cmd.product_id,
                    supplier_id: cmd.supplier_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::MarkProductInRepair(cmd) => {
                self.ensure_existing(cmd.product_id)?;
                if self.status == ProductStatus::InRepair {
                    return Err(DomainError::conflict("product is already in repair"));
                }
                Ok(vec![ProductEvent::ProductMarkedInRepair(ProductMarkedInRepair {
                    product_id: cmd.product_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ProductCommand::MarkProductForSale(cmd) => {
                self.ensure_existing(cmd.product_id)?;
                if self.status == ProductStatus::ForSale {
                    return Err(DomainError::conflict("product is already for sale"));
                }
                Ok(vec![ProductEvent::ProductMarkedForSale(ProductMarkedForSale {
                    product_id: cmd.product_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

fn normalize_description(description: Option<&str>) -> String {
    match description.map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => DEFAULT_DESCRIPTION.to_string(),
    }
}

impl Product {
    fn ensure_existing(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }

        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        // Name uniqueness spans the whole catalog and is checked by the store.

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            name: name.to_string(),
            category_id: cmd.category_id,
            description: normalize_description(cmd.description.as_deref()),
            initial_selling_price: cmd.initial_selling_price,
            suppliers: cmd.suppliers.iter().copied().collect(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProductDetails) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.product_id)?;

        let name = match cmd.name.as_deref().map(str::trim) {
            Some("") => return Err(DomainError::validation("name cannot be empty")),
            Some(n) => n.to_string(),
            None => self.name.clone(),
        };
        let category_id = match cmd.category_id.or(self.category_id) {
            Some(c) => c,
            None => return Err(DomainError::invariant("product has no category")),
        };
        let description = match &cmd.description {
            Some(d) => normalize_description(Some(d.as_str())),
            None => self.description.clone(),
        };
        let initial_selling_price = cmd
            .initial_selling_price
            .unwrap_or(self.initial_selling_price);

        if name == self.name
            && Some(category_id) == self.category_id
            && description == self.description
            && initial_selling_price == self.initial_selling_price
        {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductDetailsUpdated(ProductDetailsUpdated {
            product_id: cmd.product_id,
            name,
            category_id,
            description,
            initial_selling_price,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdesk_core::AggregateId;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_category_id() -> CategoryId {
        CategoryId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn create_cmd(id: ProductId, name: &str) -> ProductCommand {
        ProductCommand::CreateProduct(CreateProduct {
            product_id: id,
            name: name.to_string(),
            category_id: test_category_id(),
            description: None,
            initial_selling_price: 45_000,
            suppliers: vec![],
            occurred_at: test_time(),
        })
    }

    fn created(id: ProductId) -> Product {
        let mut product = Product::empty(id);
        product.execute(&create_cmd(id, "ThinkPad T480")).unwrap();
        product
    }

    #[test]
    fn create_product_defaults_description_and_is_sellable() {
        let id = test_product_id();
        let product = created(id);

        assert_eq!(product.name(), "ThinkPad T480");
        assert_eq!(product.description(), DEFAULT_DESCRIPTION);
        assert_eq!(product.status(), ProductStatus::ForSale);
        assert!(product.is_sellable());
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn create_product_rejects_empty_name() {
        let id = test_product_id();
        let err = Product::empty(id).handle(&create_cmd(id, "  ")).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_product_rejects_duplicate_creation() {
        let id = test_product_id();
        let product = created(id);
        let err = product.handle(&create_cmd(id, "Again")).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn marking_in_repair_removes_product_from_listing() {
        let id = test_product_id();
        let mut product = created(id);

        product
            .execute(&ProductCommand::MarkProductInRepair(MarkProductInRepair {
                product_id: id,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(!product.is_sellable());

        let other = created(test_product_id());
        let listed: Vec<_> = sellable([&product, &other]).map(|p| p.id_typed()).collect();
        assert_eq!(listed, vec![other.id_typed()]);

        product
            .execute(&ProductCommand::MarkProductForSale(MarkProductForSale {
                product_id: id,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(product.is_sellable());
    }

    #[test]
    fn linking_same_supplier_twice_is_a_no_op() {
        let id = test_product_id();
        let mut product = created(id);
        let supplier = SupplierId::generate();
        let link = ProductCommand::LinkSupplier(LinkSupplier {
            product_id: id,
            supplier_id: supplier,
            occurred_at: test_time(),
        });

        assert_eq!(product.execute(&link).unwrap().len(), 1);
        assert!(product.execute(&link).unwrap().is_empty());
        assert!(product.suppliers().contains(&supplier));

        product
            .execute(&ProductCommand::UnlinkSupplier(UnlinkSupplier {
                product_id: id,
                supplier_id: supplier,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(product.suppliers().is_empty());
    }

    #[test]
    fn update_details_keeps_unspecified_fields() {
        let id = test_product_id();
        let mut product = created(id);

        product
            .execute(&ProductCommand::UpdateProductDetails(UpdateProductDetails {
                product_id: id,
                name: None,
                category_id: None,
                description: Some("14\" business laptop".to_string()),
                initial_selling_price: Some(47_500),
                occurred_at: test_time(),
            }))
            .unwrap();

        assert_eq!(product.name(), "ThinkPad T480");
        assert_eq!(product.description(), "14\" business laptop");
        assert_eq!(product.initial_selling_price(), 47_500);
    }

    #[test]
    fn record_round_trip_preserves_version() {
        let id = test_product_id();
        let product = created(id);
        let restored = Product::from_record(product.to_record().unwrap());
        assert_eq!(restored, product);
        assert!(Product::empty(id).to_record().is_none());
    }

    #[test]
    fn commands_on_missing_product_are_not_found() {
        let id = test_product_id();
        let err = Product::empty(id)
            .handle(&ProductCommand::MarkProductInRepair(MarkProductInRepair {
                product_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
