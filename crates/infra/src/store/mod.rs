//! Persistence boundary.
//!
//! A [`Store`] hands out [`UnitOfWork`]s. One unit of work is one transaction:
//! rows read through it are locked until it ends, writes become visible on
//! [`UnitOfWork::commit`], and dropping it without committing rolls back.
//!
//! Saves are version-checked: callers pass the version the aggregate had when it
//! was loaded (`ExpectedVersion::Exact(0)` for a row that does not exist yet) and
//! the store rejects the write with [`StoreError::Concurrency`] if the stored row
//! has moved on.

use async_trait::async_trait;
use thiserror::Error;

use shopdesk_auth::Role;
use shopdesk_catalog::{Category, CategoryId, Product, ProductId};
use shopdesk_core::{AccountId, ExpectedVersion};
use shopdesk_inventory::StockLevel;
use shopdesk_parties::{Client, ClientId, Employee, EmployeeId, Supplier, SupplierId};
use shopdesk_purchasing::{PurchaseOrder, PurchaseOrderId};
use shopdesk_repairs::{HardwareId, HardwareLinks, HardwareToRepair, Repair, RepairId};
use shopdesk_sales::{Sale, SaleId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation error.
///
/// These are infrastructure failures, as opposed to domain errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The stored row changed since it was loaded.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A uniqueness rule rejected the write (duplicate name, phone, email, line).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A row the write depends on does not exist.
    #[error("missing reference: {0}")]
    MissingReference(String),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(String),
}

/// An account as far as access control is concerned.
///
/// A linked account carries its employee's role; the two are written in the
/// same unit of work. Only the bootstrap admin has no employee.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub account_id: AccountId,
    pub employee_id: Option<EmployeeId>,
    pub role: Role,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;
}

/// One transaction against the store.
#[async_trait]
pub trait UnitOfWork: Send {
    // accounts
    /// Insert an account. An employee has at most one.
    async fn insert_account(&mut self, account: AccountRecord) -> StoreResult<()>;
    /// Insert `account` only if no account exists yet. Returns whether it was
    /// inserted; concurrent callers see exactly one `true`.
    async fn insert_first_account(&mut self, account: AccountRecord) -> StoreResult<bool>;
    async fn save_account(&mut self, account: AccountRecord) -> StoreResult<()>;
    async fn load_account(&mut self, id: AccountId) -> StoreResult<Option<AccountRecord>>;
    async fn account_of_employee(&mut self, employee_id: EmployeeId) -> StoreResult<Option<AccountRecord>>;
    async fn list_accounts(&mut self) -> StoreResult<Vec<AccountRecord>>;
    /// Returns whether the account existed.
    async fn delete_account(&mut self, id: AccountId) -> StoreResult<bool>;

    // employees
    async fn load_employee(&mut self, id: EmployeeId) -> StoreResult<Option<Employee>>;
    async fn save_employee(&mut self, employee: &Employee, expected: ExpectedVersion) -> StoreResult<()>;
    /// Delete the employee together with its account.
    async fn delete_employee(&mut self, id: EmployeeId, expected: ExpectedVersion) -> StoreResult<()>;

    // catalog
    async fn insert_category(&mut self, category: &Category) -> StoreResult<()>;
    async fn load_category(&mut self, id: CategoryId) -> StoreResult<Option<Category>>;
    /// Insert a new product together with its opened stock level.
    async fn insert_product(&mut self, product: &Product, stock: &StockLevel) -> StoreResult<()>;
    async fn load_product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;
    async fn save_product(&mut self, product: &Product, expected: ExpectedVersion) -> StoreResult<()>;
    /// Every product with its current on-hand quantity, ordered by name.
    async fn list_products(&mut self) -> StoreResult<Vec<(Product, i64)>>;
    /// Whether any sale or purchase order line names the product.
    async fn product_in_use(&mut self, id: ProductId) -> StoreResult<bool>;
    /// Delete a product with its stock level and supplier links.
    async fn delete_product(&mut self, id: ProductId, expected: ExpectedVersion) -> StoreResult<()>;
    async fn products_of_supplier(&mut self, supplier_id: SupplierId) -> StoreResult<Vec<ProductId>>;

    // inventory
    /// Read a product's stock level and lock it for the rest of the transaction.
    async fn lock_stock(&mut self, product_id: ProductId) -> StoreResult<Option<StockLevel>>;
    async fn save_stock(&mut self, level: &StockLevel, expected: ExpectedVersion) -> StoreResult<()>;

    // parties
    async fn load_client(&mut self, id: ClientId) -> StoreResult<Option<Client>>;
    async fn save_client(&mut self, client: &Client, expected: ExpectedVersion) -> StoreResult<()>;
    async fn load_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>>;
    async fn save_supplier(&mut self, supplier: &Supplier, expected: ExpectedVersion) -> StoreResult<()>;
    /// Fails with `Conflict` while another row still points at the party.
    async fn delete_client(&mut self, id: ClientId, expected: ExpectedVersion) -> StoreResult<()>;
    async fn delete_supplier(&mut self, id: SupplierId, expected: ExpectedVersion) -> StoreResult<()>;

    // sales
    async fn load_sale(&mut self, id: SaleId) -> StoreResult<Option<Sale>>;
    /// Write the sale and replace its lines.
    async fn save_sale(&mut self, sale: &Sale, expected: ExpectedVersion) -> StoreResult<()>;
    async fn delete_sale(&mut self, id: SaleId, expected: ExpectedVersion) -> StoreResult<()>;
    async fn sales_of_client(&mut self, client_id: ClientId) -> StoreResult<Vec<SaleId>>;

    // purchasing
    async fn load_purchase_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>>;
    async fn save_purchase_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;
    async fn delete_purchase_order(
        &mut self,
        id: PurchaseOrderId,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;
    async fn orders_of_supplier(&mut self, supplier_id: SupplierId) -> StoreResult<Vec<PurchaseOrderId>>;

    // repairs
    async fn insert_hardware(&mut self, hardware: &HardwareToRepair) -> StoreResult<()>;
    async fn load_hardware(&mut self, id: HardwareId) -> StoreResult<Option<HardwareToRepair>>;
    async fn save_hardware(&mut self, hardware: &HardwareToRepair) -> StoreResult<()>;
    async fn list_hardware(&mut self) -> StoreResult<Vec<HardwareToRepair>>;
    /// Which repair each linked hardware belongs to.
    async fn hardware_links(&mut self) -> StoreResult<HardwareLinks>;
    async fn load_repair(&mut self, id: RepairId) -> StoreResult<Option<Repair>>;
    async fn save_repair(&mut self, repair: &Repair, expected: ExpectedVersion) -> StoreResult<()>;
    async fn repairs_of_client(&mut self, client_id: ClientId) -> StoreResult<Vec<RepairId>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

pub(crate) fn check_version(
    kind: &str,
    id: impl core::fmt::Display,
    expected: ExpectedVersion,
    actual: u64,
) -> StoreResult<()> {
    if expected.matches(actual) {
        Ok(())
    } else {
        Err(StoreError::Concurrency(format!(
            "{kind} {id}: expected {expected:?}, found version {actual}"
        )))
    }
}
