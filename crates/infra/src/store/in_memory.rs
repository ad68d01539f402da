//! In-memory store for tests and development.
//!
//! Transactions are serialized: `begin` takes the table lock and holds it until
//! the unit of work ends. Writes go to a private copy of the tables that
//! replaces the shared ones on commit, so a dropped unit of work leaves nothing
//! behind. Uniqueness and reference rules mirror the Postgres schema.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use shopdesk_catalog::{Category, CategoryId, Product, ProductId};
use shopdesk_core::{AccountId, AggregateRoot, ExpectedVersion};
use shopdesk_inventory::StockLevel;
use shopdesk_parties::{Client, ClientId, ContactInfo, Employee, EmployeeId, Supplier, SupplierId};
use shopdesk_purchasing::{PurchaseOrder, PurchaseOrderId};
use shopdesk_repairs::{HardwareId, HardwareLinks, HardwareToRepair, Repair, RepairId};
use shopdesk_sales::{Sale, SaleId};

use super::{AccountRecord, Store, StoreError, StoreResult, UnitOfWork, check_version};

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: BTreeMap<AccountId, AccountRecord>,
    employees: HashMap<EmployeeId, Employee>,
    categories: HashMap<CategoryId, Category>,
    products: HashMap<ProductId, Product>,
    stocks: HashMap<ProductId, StockLevel>,
    clients: HashMap<ClientId, Client>,
    suppliers: HashMap<SupplierId, Supplier>,
    sales: HashMap<SaleId, Sale>,
    orders: HashMap<PurchaseOrderId, PurchaseOrder>,
    hardware: HashMap<HardwareId, HardwareToRepair>,
    repairs: HashMap<RepairId, Repair>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryUnitOfWork { guard, working }))
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn contact_taken<'a>(
    kind: &str,
    contact: &ContactInfo,
    others: impl Iterator<Item = &'a ContactInfo>,
) -> StoreResult<()> {
    for other in others {
        if other.phone == contact.phone {
            return Err(StoreError::Conflict(format!(
                "a {kind} with phone {} already exists",
                contact.phone
            )));
        }
        if other.email == contact.email {
            return Err(StoreError::Conflict(format!(
                "a {kind} with email {} already exists",
                contact.email
            )));
        }
    }
    Ok(())
}

impl InMemoryUnitOfWork {
    fn ensure_product_name_free(&self, product: &Product) -> StoreResult<()> {
        let taken = self
            .working
            .products
            .values()
            .any(|p| p.id_typed() != product.id_typed() && p.name() == product.name());
        if taken {
            return Err(StoreError::Conflict(format!(
                "a product named {:?} already exists",
                product.name()
            )));
        }
        Ok(())
    }

    fn ensure_category(&self, id: CategoryId) -> StoreResult<()> {
        if self.working.categories.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::MissingReference(format!("category {id}")))
        }
    }

    fn ensure_products<'a>(&self, ids: impl IntoIterator<Item = &'a ProductId>) -> StoreResult<()> {
        for id in ids {
            if !self.working.products.contains_key(id) {
                return Err(StoreError::MissingReference(format!("product {id}")));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn insert_account(&mut self, account: AccountRecord) -> StoreResult<()> {
        if self.working.accounts.contains_key(&account.account_id) {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.account_id
            )));
        }
        if let Some(employee_id) = account.employee_id {
            if !self.working.employees.contains_key(&employee_id) {
                return Err(StoreError::MissingReference(format!("employee {employee_id}")));
            }
            if self.account_of_employee(employee_id).await?.is_some() {
                return Err(StoreError::Conflict(format!(
                    "employee {employee_id} already has an account"
                )));
            }
        }
        self.working.accounts.insert(account.account_id, account);
        Ok(())
    }

    async fn insert_first_account(&mut self, account: AccountRecord) -> StoreResult<bool> {
        // The table lock is held for the whole unit of work.
        if !self.working.accounts.is_empty() {
            return Ok(false);
        }
        self.insert_account(account).await?;
        Ok(true)
    }

    async fn save_account(&mut self, account: AccountRecord) -> StoreResult<()> {
        match self.working.accounts.get_mut(&account.account_id) {
            Some(stored) => {
                *stored = account;
                Ok(())
            }
            None => Err(StoreError::MissingReference(format!(
                "account {}",
                account.account_id
            ))),
        }
    }

    async fn load_account(&mut self, id: AccountId) -> StoreResult<Option<AccountRecord>> {
        Ok(self.working.accounts.get(&id).copied())
    }

    async fn account_of_employee(&mut self, employee_id: EmployeeId) -> StoreResult<Option<AccountRecord>> {
        Ok(self
            .working
            .accounts
            .values()
            .find(|a| a.employee_id == Some(employee_id))
            .copied())
    }

    async fn list_accounts(&mut self) -> StoreResult<Vec<AccountRecord>> {
        Ok(self.working.accounts.values().copied().collect())
    }

    async fn delete_account(&mut self, id: AccountId) -> StoreResult<bool> {
        Ok(self.working.accounts.remove(&id).is_some())
    }

    async fn load_employee(&mut self, id: EmployeeId) -> StoreResult<Option<Employee>> {
        Ok(self.working.employees.get(&id).cloned())
    }

    async fn save_employee(&mut self, employee: &Employee, expected: ExpectedVersion) -> StoreResult<()> {
        let id = employee.id_typed();
        let actual = self.working.employees.get(&id).map_or(0, |e| e.version());
        check_version("employee", id, expected, actual)?;
        contact_taken(
            "employee",
            employee.contact(),
            self.working
                .employees
                .values()
                .filter(|e| e.id_typed() != id)
                .map(Employee::contact),
        )?;
        self.working.employees.insert(id, employee.clone());
        Ok(())
    }

    async fn delete_employee(&mut self, id: EmployeeId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.working.employees.get(&id).map_or(0, |e| e.version());
        check_version("employee", id, expected, actual)?;
        self.working.employees.remove(&id);
        self.working.accounts.retain(|_, a| a.employee_id != Some(id));
        Ok(())
    }

    async fn insert_category(&mut self, category: &Category) -> StoreResult<()> {
        if self.working.categories.contains_key(&category.id) {
            return Err(StoreError::Conflict(format!("category {} already exists", category.id)));
        }
        self.working.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn load_category(&mut self, id: CategoryId) -> StoreResult<Option<Category>> {
        Ok(self.working.categories.get(&id).cloned())
    }

    async fn insert_product(&mut self, product: &Product, stock: &StockLevel) -> StoreResult<()> {
        let id = product.id_typed();
        if stock.product_id() != id {
            return Err(StoreError::MissingReference(format!(
                "stock level for product {id} belongs to {}",
                stock.product_id()
            )));
        }
        if self.working.products.contains_key(&id) {
            return Err(StoreError::Conflict(format!("product {id} already exists")));
        }
        self.ensure_product_name_free(product)?;
        if let Some(category_id) = product.category_id() {
            self.ensure_category(category_id)?;
        }
        self.working.products.insert(id, product.clone());
        self.working.stocks.insert(id, stock.clone());
        Ok(())
    }

    async fn load_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn save_product(&mut self, product: &Product, expected: ExpectedVersion) -> StoreResult<()> {
        let id = product.id_typed();
        let actual = self.working.products.get(&id).map_or(0, |p| p.version());
        check_version("product", id, expected, actual)?;
        if actual == 0 {
            return Err(StoreError::MissingReference(format!(
                "product {id} must be inserted with its stock level"
            )));
        }
        self.ensure_product_name_free(product)?;
        if let Some(category_id) = product.category_id() {
            self.ensure_category(category_id)?;
        }
        self.working.products.insert(id, product.clone());
        Ok(())
    }

    async fn list_products(&mut self) -> StoreResult<Vec<(Product, i64)>> {
        let mut rows: Vec<(Product, i64)> = self
            .working
            .products
            .values()
            .map(|p| {
                let quantity = self
                    .working
                    .stocks
                    .get(&p.id_typed())
                    .map_or(0, StockLevel::quantity);
                (p.clone(), quantity)
            })
            .collect();
        rows.sort_by(|a, b| a.0.name().cmp(b.0.name()));
        Ok(rows)
    }

    async fn product_in_use(&mut self, id: ProductId) -> StoreResult<bool> {
        let on_sale = self
            .working
            .sales
            .values()
            .any(|s| s.items().iter().any(|i| i.product_id == id));
        let on_order = self
            .working
            .orders
            .values()
            .any(|o| o.items().iter().any(|i| i.product_id == id));
        Ok(on_sale || on_order)
    }

    async fn delete_product(&mut self, id: ProductId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.working.products.get(&id).map_or(0, |p| p.version());
        check_version("product", id, expected, actual)?;
        if self.product_in_use(id).await? {
            return Err(StoreError::Conflict(format!("product {id} is still on a sale or order")));
        }
        self.working.products.remove(&id);
        self.working.stocks.remove(&id);
        Ok(())
    }

    async fn products_of_supplier(&mut self, supplier_id: SupplierId) -> StoreResult<Vec<ProductId>> {
        let mut ids: Vec<ProductId> = self
            .working
            .products
            .values()
            .filter(|p| p.suppliers().contains(&supplier_id))
            .map(Product::id_typed)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn lock_stock(&mut self, product_id: ProductId) -> StoreResult<Option<StockLevel>> {
        Ok(self.working.stocks.get(&product_id).cloned())
    }

    async fn save_stock(&mut self, level: &StockLevel, expected: ExpectedVersion) -> StoreResult<()> {
        let id = level.product_id();
        let actual = self.working.stocks.get(&id).map_or(0, |s| s.version());
        check_version("stock level", id, expected, actual)?;
        self.ensure_products([&id])?;
        if level.quantity() < 0 {
            return Err(StoreError::Conflict(format!(
                "stock of product {id} cannot go negative"
            )));
        }
        self.working.stocks.insert(id, level.clone());
        Ok(())
    }

    async fn load_client(&mut self, id: ClientId) -> StoreResult<Option<Client>> {
        Ok(self.working.clients.get(&id).cloned())
    }

    async fn save_client(&mut self, client: &Client, expected: ExpectedVersion) -> StoreResult<()> {
        let id = client.id_typed();
        let actual = self.working.clients.get(&id).map_or(0, |c| c.version());
        check_version("client", id, expected, actual)?;
        contact_taken(
            "client",
            client.contact(),
            self.working
                .clients
                .values()
                .filter(|c| c.id_typed() != id)
                .map(Client::contact),
        )?;
        self.working.clients.insert(id, client.clone());
        Ok(())
    }

    async fn load_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        Ok(self.working.suppliers.get(&id).cloned())
    }

    async fn save_supplier(&mut self, supplier: &Supplier, expected: ExpectedVersion) -> StoreResult<()> {
        let id = supplier.id_typed();
        let actual = self.working.suppliers.get(&id).map_or(0, |s| s.version());
        check_version("supplier", id, expected, actual)?;
        contact_taken(
            "supplier",
            supplier.contact(),
            self.working
                .suppliers
                .values()
                .filter(|s| s.id_typed() != id)
                .map(Supplier::contact),
        )?;
        self.working.suppliers.insert(id, supplier.clone());
        Ok(())
    }

    async fn delete_client(&mut self, id: ClientId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.working.clients.get(&id).map_or(0, |c| c.version());
        check_version("client", id, expected, actual)?;
        let referenced = self.working.sales.values().any(|s| s.client_id() == Some(id))
            || self.working.repairs.values().any(|r| r.client_id() == Some(id));
        if referenced {
            return Err(StoreError::Conflict(format!("client {id} is still referenced")));
        }
        self.working.clients.remove(&id);
        Ok(())
    }

    async fn delete_supplier(&mut self, id: SupplierId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.working.suppliers.get(&id).map_or(0, |s| s.version());
        check_version("supplier", id, expected, actual)?;
        let referenced = self.working.orders.values().any(|o| o.supplier_id() == Some(id))
            || self.working.products.values().any(|p| p.suppliers().contains(&id));
        if referenced {
            return Err(StoreError::Conflict(format!("supplier {id} is still referenced")));
        }
        self.working.suppliers.remove(&id);
        Ok(())
    }

    async fn load_sale(&mut self, id: SaleId) -> StoreResult<Option<Sale>> {
        Ok(self.working.sales.get(&id).cloned())
    }

    async fn save_sale(&mut self, sale: &Sale, expected: ExpectedVersion) -> StoreResult<()> {
        let id = sale.id_typed();
        let actual = self.working.sales.get(&id).map_or(0, |s| s.version());
        check_version("sale", id, expected, actual)?;
        if let Some(client_id) = sale.client_id() {
            if !self.working.clients.contains_key(&client_id) {
                return Err(StoreError::MissingReference(format!("client {client_id}")));
            }
        }
        self.ensure_products(sale.items().iter().map(|i| &i.product_id))?;
        self.working.sales.insert(id, sale.clone());
        Ok(())
    }

    async fn delete_sale(&mut self, id: SaleId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.working.sales.get(&id).map_or(0, |s| s.version());
        check_version("sale", id, expected, actual)?;
        self.working.sales.remove(&id);
        Ok(())
    }

    async fn sales_of_client(&mut self, client_id: ClientId) -> StoreResult<Vec<SaleId>> {
        let mut ids: Vec<SaleId> = self
            .working
            .sales
            .values()
            .filter(|s| s.client_id() == Some(client_id))
            .map(Sale::id_typed)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn load_purchase_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn save_purchase_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let id = order.id_typed();
        let actual = self.working.orders.get(&id).map_or(0, |o| o.version());
        check_version("purchase order", id, expected, actual)?;
        if let Some(supplier_id) = order.supplier_id() {
            if !self.working.suppliers.contains_key(&supplier_id) {
                return Err(StoreError::MissingReference(format!("supplier {supplier_id}")));
            }
        }
        self.ensure_products(order.items().iter().map(|i| &i.product_id))?;
        self.working.orders.insert(id, order.clone());
        Ok(())
    }

    async fn delete_purchase_order(
        &mut self,
        id: PurchaseOrderId,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let actual = self.working.orders.get(&id).map_or(0, |o| o.version());
        check_version("purchase order", id, expected, actual)?;
        self.working.orders.remove(&id);
        Ok(())
    }

    async fn orders_of_supplier(&mut self, supplier_id: SupplierId) -> StoreResult<Vec<PurchaseOrderId>> {
        let mut ids: Vec<PurchaseOrderId> = self
            .working
            .orders
            .values()
            .filter(|o| o.supplier_id() == Some(supplier_id))
            .map(PurchaseOrder::id_typed)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn insert_hardware(&mut self, hardware: &HardwareToRepair) -> StoreResult<()> {
        let id = hardware.id_typed();
        if self.working.hardware.contains_key(&id) {
            return Err(StoreError::Conflict(format!("hardware {id} already exists")));
        }
        self.ensure_category(hardware.category_id())?;
        self.working.hardware.insert(id, hardware.clone());
        Ok(())
    }

    async fn load_hardware(&mut self, id: HardwareId) -> StoreResult<Option<HardwareToRepair>> {
        Ok(self.working.hardware.get(&id).cloned())
    }

    async fn save_hardware(&mut self, hardware: &HardwareToRepair) -> StoreResult<()> {
        let id = hardware.id_typed();
        if !self.working.hardware.contains_key(&id) {
            return Err(StoreError::MissingReference(format!("hardware {id}")));
        }
        self.working.hardware.insert(id, hardware.clone());
        Ok(())
    }

    async fn list_hardware(&mut self) -> StoreResult<Vec<HardwareToRepair>> {
        let mut all: Vec<HardwareToRepair> = self.working.hardware.values().cloned().collect();
        all.sort_by_key(HardwareToRepair::id_typed);
        Ok(all)
    }

    async fn hardware_links(&mut self) -> StoreResult<HardwareLinks> {
        Ok(self
            .working
            .repairs
            .values()
            .filter_map(|r| r.hardware_id().map(|hw| (hw, r.id_typed())))
            .collect())
    }

    async fn load_repair(&mut self, id: RepairId) -> StoreResult<Option<Repair>> {
        Ok(self.working.repairs.get(&id).cloned())
    }

    async fn save_repair(&mut self, repair: &Repair, expected: ExpectedVersion) -> StoreResult<()> {
        let id = repair.id_typed();
        let actual = self.working.repairs.get(&id).map_or(0, |r| r.version());
        check_version("repair", id, expected, actual)?;

        let hardware_id = repair
            .hardware_id()
            .ok_or_else(|| StoreError::MissingReference(format!("hardware of repair {id}")))?;
        if !self.working.hardware.contains_key(&hardware_id) {
            return Err(StoreError::MissingReference(format!("hardware {hardware_id}")));
        }
        let linked_elsewhere = self
            .working
            .repairs
            .values()
            .any(|r| r.id_typed() != id && r.hardware_id() == Some(hardware_id));
        if linked_elsewhere {
            return Err(StoreError::Conflict(format!(
                "hardware {hardware_id} is already linked to another repair"
            )));
        }
        if let Some(client_id) = repair.client_id() {
            if !self.working.clients.contains_key(&client_id) {
                return Err(StoreError::MissingReference(format!("client {client_id}")));
            }
        }
        self.working.repairs.insert(id, repair.clone());
        Ok(())
    }

    async fn repairs_of_client(&mut self, client_id: ClientId) -> StoreResult<Vec<RepairId>> {
        let mut ids: Vec<RepairId> = self
            .working
            .repairs
            .values()
            .filter(|r| r.client_id() == Some(client_id))
            .map(Repair::id_typed)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
