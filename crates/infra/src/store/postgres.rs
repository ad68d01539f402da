//! Postgres-backed store.
//!
//! One [`PgUnitOfWork`] wraps one database transaction. Loads that precede a
//! write use `SELECT ... FOR UPDATE`, so the row stays locked until commit or
//! rollback; stock reads always lock. Dropping the unit of work rolls back.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |---|---|---|
//! | `23505` | `Conflict` | duplicate product name, phone, email, sale/order line |
//! | `23503` | `MissingReference` | row points at a category/product/client that does not exist |
//! | `23503` on delete | `Conflict` | another row still points at the deleted one |
//! | `23514` | `Conflict` | check constraint (negative stock, prepayment above price) |
//! | other | `Database` | connection failures, pool closed, etc. |

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use shopdesk_auth::Role;
use shopdesk_catalog::{Category, CategoryId, Product, ProductId, ProductRecord, ProductStatus};
use shopdesk_core::{AccountId, AggregateRoot, ExpectedVersion};
use shopdesk_inventory::StockLevel;
use shopdesk_parties::{Client, ClientId, ContactInfo, Employee, EmployeeId, Supplier, SupplierId};
use shopdesk_purchasing::{PurchaseOrder, PurchaseOrderId, PurchaseOrderItem};
use shopdesk_repairs::{
    HardwareId, HardwareLinks, HardwareState, HardwareToRepair, Repair, RepairId, RepairRecord,
    RepairState,
};
use shopdesk_sales::{Sale, SaleId, SaleItem};

use super::{AccountRecord, Store, StoreError, StoreResult, UnitOfWork, check_version};

/// Migrations embedded from `crates/infra/migrations`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    /// Lock the row and return its version; 0 when absent.
    async fn locked_version(
        &mut self,
        table: &'static str,
        key: &'static str,
        id: Uuid,
    ) -> StoreResult<u64> {
        let sql = format!("SELECT version FROM {table} WHERE {key} = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("locked_version", e))?;
        match row {
            Some(row) => from_db(get(&row, "version")?, "version"),
            None => Ok(0),
        }
    }

    /// Lock-checked delete of one row. A foreign key still pointing at the row
    /// surfaces as `Conflict`.
    async fn delete_row(&mut self, table: &'static str, id: Uuid, operation: &str) -> StoreResult<()> {
        let sql = format!("DELETE FROM {table} WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| match map_sqlx_error(operation, e) {
                StoreError::MissingReference(msg) => StoreError::Conflict(msg),
                other => other,
            })?;
        Ok(())
    }

    async fn ids_where(&mut self, sql: &'static str, key: Uuid, operation: &str) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query(sql)
            .bind(key)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(|r| get::<Uuid>(r, "id")).collect()
    }

    async fn supplier_links(&mut self, product_id: Uuid) -> StoreResult<BTreeSet<SupplierId>> {
        let rows = sqlx::query("SELECT supplier_id FROM product_suppliers WHERE product_id = $1")
            .bind(product_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("supplier_links", e))?;
        rows.iter()
            .map(|r| get::<Uuid>(r, "supplier_id").map(SupplierId::from))
            .collect()
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    #[instrument(skip(self), fields(account_id = %account.account_id, role = %account.role), err)]
    async fn insert_account(&mut self, account: AccountRecord) -> StoreResult<()> {
        sqlx::query("INSERT INTO accounts (id, employee_id, role) VALUES ($1, $2, $3)")
            .bind(*account.account_id.as_uuid())
            .bind(account.employee_id.map(|e| *e.as_uuid()))
            .bind(account.role.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_account", e))?;
        Ok(())
    }

    /// The table lock conflicts with itself, so a second bootstrap waits for the
    /// first to commit and then sees its row.
    #[instrument(skip(self), fields(account_id = %account.account_id), err)]
    async fn insert_first_account(&mut self, account: AccountRecord) -> StoreResult<bool> {
        sqlx::query("LOCK TABLE accounts IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_accounts", e))?;
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, employee_id, role)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (SELECT 1 FROM accounts)
            "#,
        )
        .bind(*account.account_id.as_uuid())
        .bind(account.employee_id.map(|e| *e.as_uuid()))
        .bind(account.role.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_first_account", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(account_id = %account.account_id, role = %account.role), err)]
    async fn save_account(&mut self, account: AccountRecord) -> StoreResult<()> {
        let result = sqlx::query("UPDATE accounts SET employee_id = $2, role = $3 WHERE id = $1")
            .bind(*account.account_id.as_uuid())
            .bind(account.employee_id.map(|e| *e.as_uuid()))
            .bind(account.role.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("save_account", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingReference(format!(
                "account {}",
                account.account_id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn load_account(&mut self, id: AccountId) -> StoreResult<Option<AccountRecord>> {
        let row = sqlx::query("SELECT id, employee_id, role FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_account", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self), fields(employee_id = %employee_id), err)]
    async fn account_of_employee(&mut self, employee_id: EmployeeId) -> StoreResult<Option<AccountRecord>> {
        let row = sqlx::query("SELECT id, employee_id, role FROM accounts WHERE employee_id = $1 FOR UPDATE")
            .bind(*employee_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("account_of_employee", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_accounts(&mut self) -> StoreResult<Vec<AccountRecord>> {
        let rows = sqlx::query("SELECT id, employee_id, role FROM accounts ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_accounts", e))?;
        rows.iter().map(account_from_row).collect()
    }

    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn delete_account(&mut self, id: AccountId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_account", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(employee_id = %id), err)]
    async fn load_employee(&mut self, id: EmployeeId) -> StoreResult<Option<Employee>> {
        let row = sqlx::query(
            r#"
            SELECT id, first_name, last_name, phone, email, address, role, salary, version
            FROM employees
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_employee", e))?;
        row.as_ref().map(employee_from_row).transpose()
    }

    #[instrument(skip(self, employee), fields(employee_id = %employee.id_typed()), err)]
    async fn save_employee(&mut self, employee: &Employee, expected: ExpectedVersion) -> StoreResult<()> {
        let id = employee.id_typed();
        let actual = self.locked_version("employees", "id", *id.as_uuid()).await?;
        check_version("employee", id, expected, actual)?;

        sqlx::query(
            r#"
            INSERT INTO employees
                (id, first_name, last_name, phone, email, address, role, salary, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                phone = EXCLUDED.phone,
                email = EXCLUDED.email,
                address = EXCLUDED.address,
                role = EXCLUDED.role,
                salary = EXCLUDED.salary,
                version = EXCLUDED.version
            "#,
        )
        .bind(*id.as_uuid())
        .bind(employee.first_name())
        .bind(employee.last_name())
        .bind(&employee.contact().phone)
        .bind(&employee.contact().email)
        .bind(&employee.contact().address)
        .bind(employee.role().as_str())
        .bind(employee.salary().map(|s| to_db(s, "salary")).transpose()?)
        .bind(to_db(employee.version(), "version")?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_employee", e))?;
        Ok(())
    }

    /// The linked account goes through `ON DELETE CASCADE`.
    #[instrument(skip(self), fields(employee_id = %id), err)]
    async fn delete_employee(&mut self, id: EmployeeId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.locked_version("employees", "id", *id.as_uuid()).await?;
        check_version("employee", id, expected, actual)?;
        self.delete_row("employees", *id.as_uuid(), "delete_employee").await
    }

    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    async fn insert_category(&mut self, category: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name) VALUES ($1, $2)")
            .bind(*category.id.as_uuid())
            .bind(&category.name)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn load_category(&mut self, id: CategoryId) -> StoreResult<Option<Category>> {
        let row = sqlx::query("SELECT id, name FROM categories WHERE id = $1")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_category", e))?;
        row.map(|r| {
            Ok(Category {
                id: CategoryId::from(get::<Uuid>(&r, "id")?),
                name: get(&r, "name")?,
            })
        })
        .transpose()
    }

    #[instrument(
        skip(self, product, stock),
        fields(product_id = %product.id_typed(), quantity = stock.quantity()),
        err
    )]
    async fn insert_product(&mut self, product: &Product, stock: &StockLevel) -> StoreResult<()> {
        if stock.product_id() != product.id_typed() {
            return Err(StoreError::MissingReference(format!(
                "stock level for product {} belongs to {}",
                product.id_typed(),
                stock.product_id()
            )));
        }
        upsert_product(&mut self.tx, product).await?;
        sqlx::query("INSERT INTO stock_levels (product_id, quantity, version) VALUES ($1, $2, $3)")
            .bind(*stock.product_id().as_uuid())
            .bind(stock.quantity())
            .bind(to_db(stock.version(), "version")?)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_stock_level", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn load_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, category_id, description, initial_selling_price, status, version
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_product", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let suppliers = self.supplier_links(*id.as_uuid()).await?;
        product_from_row(&row, suppliers).map(Some)
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    async fn save_product(&mut self, product: &Product, expected: ExpectedVersion) -> StoreResult<()> {
        let id = product.id_typed();
        let actual = self.locked_version("products", "id", *id.as_uuid()).await?;
        check_version("product", id, expected, actual)?;
        if actual == 0 {
            return Err(StoreError::MissingReference(format!(
                "product {id} must be inserted with its stock level"
            )));
        }
        upsert_product(&mut self.tx, product).await
    }

    #[instrument(skip(self), err)]
    async fn list_products(&mut self) -> StoreResult<Vec<(Product, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.category_id, p.description, p.initial_selling_price,
                   p.status, p.version, s.quantity
            FROM products p
            JOIN stock_levels s ON s.product_id = p.id
            ORDER BY p.name ASC
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        let links = sqlx::query("SELECT product_id, supplier_id FROM product_suppliers")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_product_suppliers", e))?;
        let mut suppliers: HashMap<Uuid, BTreeSet<SupplierId>> = HashMap::new();
        for link in &links {
            suppliers
                .entry(get(link, "product_id")?)
                .or_default()
                .insert(SupplierId::from(get::<Uuid>(link, "supplier_id")?));
        }

        rows.iter()
            .map(|row| -> StoreResult<(Product, i64)> {
                let id: Uuid = get(row, "id")?;
                let product = product_from_row(row, suppliers.remove(&id).unwrap_or_default())?;
                Ok((product, get(row, "quantity")?))
            })
            .collect()
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn product_in_use(&mut self, id: ProductId) -> StoreResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (SELECT 1 FROM sale_items WHERE product_id = $1)
                OR EXISTS (SELECT 1 FROM purchase_order_items WHERE product_id = $1) AS in_use
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("product_in_use", e))?;
        get(&row, "in_use")
    }

    /// Stock and supplier links go through `ON DELETE CASCADE`; a line item
    /// inserted concurrently still blocks the delete at commit.
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&mut self, id: ProductId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.locked_version("products", "id", *id.as_uuid()).await?;
        check_version("product", id, expected, actual)?;
        self.delete_row("products", *id.as_uuid(), "delete_product").await
    }

    #[instrument(skip(self), fields(supplier_id = %supplier_id), err)]
    async fn products_of_supplier(&mut self, supplier_id: SupplierId) -> StoreResult<Vec<ProductId>> {
        let ids = self
            .ids_where(
                "SELECT product_id AS id FROM product_suppliers WHERE supplier_id = $1 ORDER BY product_id",
                *supplier_id.as_uuid(),
                "products_of_supplier",
            )
            .await?;
        Ok(ids.into_iter().map(ProductId::from).collect())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn lock_stock(&mut self, product_id: ProductId) -> StoreResult<Option<StockLevel>> {
        let row = sqlx::query(
            "SELECT product_id, quantity, version FROM stock_levels WHERE product_id = $1 FOR UPDATE",
        )
        .bind(*product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stock", e))?;

        row.map(|r| {
            Ok(StockLevel::restore(
                ProductId::from(get::<Uuid>(&r, "product_id")?),
                get(&r, "quantity")?,
                from_db(get(&r, "version")?, "version")?,
            ))
        })
        .transpose()
    }

    #[instrument(
        skip(self, level),
        fields(product_id = %level.product_id(), quantity = level.quantity()),
        err
    )]
    async fn save_stock(&mut self, level: &StockLevel, expected: ExpectedVersion) -> StoreResult<()> {
        let id = level.product_id();
        let actual = self.locked_version("stock_levels", "product_id", *id.as_uuid()).await?;
        check_version("stock level", id, expected, actual)?;

        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, quantity, version)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                version = EXCLUDED.version
            "#,
        )
        .bind(*id.as_uuid())
        .bind(level.quantity())
        .bind(to_db(level.version(), "version")?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_stock", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(client_id = %id), err)]
    async fn load_client(&mut self, id: ClientId) -> StoreResult<Option<Client>> {
        let row = sqlx::query(
            r#"
            SELECT id, first_name, last_name, phone, email, address, version
            FROM clients
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_client", e))?;

        row.map(|r| {
            Ok(Client::restore(
                ClientId::from(get::<Uuid>(&r, "id")?),
                get(&r, "first_name")?,
                get(&r, "last_name")?,
                contact_from_row(&r)?,
                from_db(get(&r, "version")?, "version")?,
            ))
        })
        .transpose()
    }

    #[instrument(skip(self, client), fields(client_id = %client.id_typed()), err)]
    async fn save_client(&mut self, client: &Client, expected: ExpectedVersion) -> StoreResult<()> {
        let id = client.id_typed();
        let actual = self.locked_version("clients", "id", *id.as_uuid()).await?;
        check_version("client", id, expected, actual)?;

        sqlx::query(
            r#"
            INSERT INTO clients (id, first_name, last_name, phone, email, address, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                phone = EXCLUDED.phone,
                email = EXCLUDED.email,
                address = EXCLUDED.address,
                version = EXCLUDED.version
            "#,
        )
        .bind(*id.as_uuid())
        .bind(client.first_name())
        .bind(client.last_name())
        .bind(&client.contact().phone)
        .bind(&client.contact().email)
        .bind(&client.contact().address)
        .bind(to_db(client.version(), "version")?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_client", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(client_id = %id), err)]
    async fn delete_client(&mut self, id: ClientId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.locked_version("clients", "id", *id.as_uuid()).await?;
        check_version("client", id, expected, actual)?;
        self.delete_row("clients", *id.as_uuid(), "delete_client").await
    }

    #[instrument(skip(self), fields(client_id = %client_id), err)]
    async fn sales_of_client(&mut self, client_id: ClientId) -> StoreResult<Vec<SaleId>> {
        let ids = self
            .ids_where(
                "SELECT id FROM sales WHERE client_id = $1 ORDER BY id",
                *client_id.as_uuid(),
                "sales_of_client",
            )
            .await?;
        Ok(ids.into_iter().map(SaleId::from).collect())
    }

    #[instrument(skip(self), fields(client_id = %client_id), err)]
    async fn repairs_of_client(&mut self, client_id: ClientId) -> StoreResult<Vec<RepairId>> {
        let ids = self
            .ids_where(
                "SELECT id FROM repairs WHERE client_id = $1 ORDER BY id",
                *client_id.as_uuid(),
                "repairs_of_client",
            )
            .await?;
        Ok(ids.into_iter().map(RepairId::from).collect())
    }

    #[instrument(skip(self), fields(supplier_id = %id), err)]
    async fn load_supplier(&mut self, id: SupplierId) -> StoreResult<Option<Supplier>> {
        let row = sqlx::query(
            "SELECT id, name, phone, email, address, version FROM suppliers WHERE id = $1 FOR UPDATE",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_supplier", e))?;

        row.map(|r| {
            Ok(Supplier::restore(
                SupplierId::from(get::<Uuid>(&r, "id")?),
                get(&r, "name")?,
                contact_from_row(&r)?,
                from_db(get(&r, "version")?, "version")?,
            ))
        })
        .transpose()
    }

    #[instrument(skip(self, supplier), fields(supplier_id = %supplier.id_typed()), err)]
    async fn save_supplier(&mut self, supplier: &Supplier, expected: ExpectedVersion) -> StoreResult<()> {
        let id = supplier.id_typed();
        let actual = self.locked_version("suppliers", "id", *id.as_uuid()).await?;
        check_version("supplier", id, expected, actual)?;

        sqlx::query(
            r#"
            INSERT INTO suppliers (id, name, phone, email, address, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                phone = EXCLUDED.phone,
                email = EXCLUDED.email,
                address = EXCLUDED.address,
                version = EXCLUDED.version
            "#,
        )
        .bind(*id.as_uuid())
        .bind(supplier.name())
        .bind(&supplier.contact().phone)
        .bind(&supplier.contact().email)
        .bind(&supplier.contact().address)
        .bind(to_db(supplier.version(), "version")?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_supplier", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(supplier_id = %id), err)]
    async fn delete_supplier(&mut self, id: SupplierId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.locked_version("suppliers", "id", *id.as_uuid()).await?;
        check_version("supplier", id, expected, actual)?;
        self.delete_row("suppliers", *id.as_uuid(), "delete_supplier").await
    }

    #[instrument(skip(self), fields(supplier_id = %supplier_id), err)]
    async fn orders_of_supplier(&mut self, supplier_id: SupplierId) -> StoreResult<Vec<PurchaseOrderId>> {
        let ids = self
            .ids_where(
                "SELECT id FROM purchase_orders WHERE supplier_id = $1 ORDER BY id",
                *supplier_id.as_uuid(),
                "orders_of_supplier",
            )
            .await?;
        Ok(ids.into_iter().map(PurchaseOrderId::from).collect())
    }

    #[instrument(skip(self), fields(sale_id = %id), err)]
    async fn load_sale(&mut self, id: SaleId) -> StoreResult<Option<Sale>> {
        let row = sqlx::query("SELECT id, client_id, sale_date, version FROM sales WHERE id = $1 FOR UPDATE")
            .bind(*id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("load_sale", e))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, sale_price
            FROM sale_items
            WHERE sale_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_sale_items", e))?;

        let items = item_rows
            .iter()
            .map(|r| {
                Ok(SaleItem {
                    id: get::<Uuid>(r, "id")?.into(),
                    product_id: ProductId::from(get::<Uuid>(r, "product_id")?),
                    quantity: get(r, "quantity")?,
                    sale_price: from_db(get(r, "sale_price")?, "sale_price")?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(Sale::restore(
            id,
            get::<Option<Uuid>>(&row, "client_id")?.map(ClientId::from),
            get(&row, "sale_date")?,
            items,
            from_db(get(&row, "version")?, "version")?,
        )))
    }

    #[instrument(
        skip(self, sale),
        fields(sale_id = %sale.id_typed(), items = sale.items().len()),
        err
    )]
    async fn save_sale(&mut self, sale: &Sale, expected: ExpectedVersion) -> StoreResult<()> {
        let id = sale.id_typed();
        let actual = self.locked_version("sales", "id", *id.as_uuid()).await?;
        check_version("sale", id, expected, actual)?;

        sqlx::query(
            r#"
            INSERT INTO sales (id, client_id, sale_date, version)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                client_id = EXCLUDED.client_id,
                version = EXCLUDED.version
            "#,
        )
        .bind(*id.as_uuid())
        .bind(sale.client_id().map(|c| *c.as_uuid()))
        .bind(sale.sale_date())
        .bind(to_db(sale.version(), "version")?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_sale", e))?;

        sqlx::query("DELETE FROM sale_items WHERE sale_id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("clear_sale_items", e))?;

        for (position, item) in sale.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_items (id, sale_id, position, product_id, quantity, sale_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(*item.id.as_uuid())
            .bind(*id.as_uuid())
            .bind(position_to_db(position)?)
            .bind(*item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(to_db(item.sale_price, "sale_price")?)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_sale_item", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(sale_id = %id), err)]
    async fn delete_sale(&mut self, id: SaleId, expected: ExpectedVersion) -> StoreResult<()> {
        let actual = self.locked_version("sales", "id", *id.as_uuid()).await?;
        check_version("sale", id, expected, actual)?;

        sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_sale", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn load_purchase_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        let row = sqlx::query(
            r#"
            SELECT id, supplier_id, order_date, delivery_date, version
            FROM purchase_orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_purchase_order", e))?;
        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, purchase_price
            FROM purchase_order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_purchase_order_items", e))?;

        let items = item_rows
            .iter()
            .map(|r| {
                Ok(PurchaseOrderItem {
                    id: get::<Uuid>(r, "id")?.into(),
                    product_id: ProductId::from(get::<Uuid>(r, "product_id")?),
                    quantity: get(r, "quantity")?,
                    purchase_price: get::<Option<i64>>(r, "purchase_price")?
                        .map(|p| from_db(p, "purchase_price"))
                        .transpose()?,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some(PurchaseOrder::restore(
            id,
            get::<Option<Uuid>>(&row, "supplier_id")?.map(SupplierId::from),
            get(&row, "order_date")?,
            get::<Option<DateTime<Utc>>>(&row, "delivery_date")?,
            items,
            from_db(get(&row, "version")?, "version")?,
        )))
    }

    #[instrument(
        skip(self, order),
        fields(order_id = %order.id_typed(), items = order.items().len()),
        err
    )]
    async fn save_purchase_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let id = order.id_typed();
        let actual = self.locked_version("purchase_orders", "id", *id.as_uuid()).await?;
        check_version("purchase order", id, expected, actual)?;

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (id, supplier_id, order_date, delivery_date, version)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                supplier_id = EXCLUDED.supplier_id,
                delivery_date = EXCLUDED.delivery_date,
                version = EXCLUDED.version
            "#,
        )
        .bind(*id.as_uuid())
        .bind(order.supplier_id().map(|s| *s.as_uuid()))
        .bind(order.order_date())
        .bind(order.delivery_date())
        .bind(to_db(order.version(), "version")?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_purchase_order", e))?;

        sqlx::query("DELETE FROM purchase_order_items WHERE order_id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("clear_purchase_order_items", e))?;

        for (position, item) in order.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO purchase_order_items
                    (id, order_id, position, product_id, quantity, purchase_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(*item.id.as_uuid())
            .bind(*id.as_uuid())
            .bind(position_to_db(position)?)
            .bind(*item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(item.purchase_price.map(|p| to_db(p, "purchase_price")).transpose()?)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_purchase_order_item", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn delete_purchase_order(
        &mut self,
        id: PurchaseOrderId,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let actual = self.locked_version("purchase_orders", "id", *id.as_uuid()).await?;
        check_version("purchase order", id, expected, actual)?;

        sqlx::query("DELETE FROM purchase_orders WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_purchase_order", e))?;
        Ok(())
    }

    #[instrument(skip(self, hardware), fields(hardware_id = %hardware.id_typed()), err)]
    async fn insert_hardware(&mut self, hardware: &HardwareToRepair) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO hardware_to_repair (id, name, category_id, description, state)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*hardware.id_typed().as_uuid())
        .bind(hardware.name())
        .bind(*hardware.category_id().as_uuid())
        .bind(hardware.description())
        .bind(hardware.state().as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_hardware", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(hardware_id = %id), err)]
    async fn load_hardware(&mut self, id: HardwareId) -> StoreResult<Option<HardwareToRepair>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, category_id, description, state
            FROM hardware_to_repair
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_hardware", e))?;
        row.as_ref().map(hardware_from_row).transpose()
    }

    #[instrument(skip(self, hardware), fields(hardware_id = %hardware.id_typed()), err)]
    async fn save_hardware(&mut self, hardware: &HardwareToRepair) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE hardware_to_repair
            SET name = $2, category_id = $3, description = $4, state = $5
            WHERE id = $1
            "#,
        )
        .bind(*hardware.id_typed().as_uuid())
        .bind(hardware.name())
        .bind(*hardware.category_id().as_uuid())
        .bind(hardware.description())
        .bind(hardware.state().as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_hardware", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::MissingReference(format!(
                "hardware {}",
                hardware.id_typed()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_hardware(&mut self) -> StoreResult<Vec<HardwareToRepair>> {
        let rows = sqlx::query(
            "SELECT id, name, category_id, description, state FROM hardware_to_repair ORDER BY id",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_hardware", e))?;
        rows.iter().map(hardware_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn hardware_links(&mut self) -> StoreResult<HardwareLinks> {
        let rows = sqlx::query("SELECT id, hardware_id FROM repairs")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("hardware_links", e))?;
        rows.iter()
            .map(|r| -> StoreResult<(HardwareId, RepairId)> {
                Ok((
                    HardwareId::from(get::<Uuid>(r, "hardware_id")?),
                    RepairId::from(get::<Uuid>(r, "id")?),
                ))
            })
            .collect()
    }

    #[instrument(skip(self), fields(repair_id = %id), err)]
    async fn load_repair(&mut self, id: RepairId) -> StoreResult<Option<Repair>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, description, hardware_id, client_id, prepayment, repair_price,
                   state, deposit_date, delivery_date, version
            FROM repairs
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_repair", e))?;
        let Some(r) = row else {
            return Ok(None);
        };

        let state: String = get(&r, "state")?;
        let record = RepairRecord {
            id: RepairId::from(get::<Uuid>(&r, "id")?),
            title: get(&r, "title")?,
            description: get(&r, "description")?,
            hardware_id: HardwareId::from(get::<Uuid>(&r, "hardware_id")?),
            client_id: get::<Option<Uuid>>(&r, "client_id")?.map(ClientId::from),
            prepayment: from_db(get(&r, "prepayment")?, "prepayment")?,
            repair_price: from_db(get(&r, "repair_price")?, "repair_price")?,
            state: RepairState::parse(&state)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown repair state {state:?}")))?,
            deposit_date: get(&r, "deposit_date")?,
            delivery_date: get(&r, "delivery_date")?,
            version: from_db(get(&r, "version")?, "version")?,
        };
        Ok(Some(Repair::from_record(record)))
    }

    #[instrument(
        skip(self, repair),
        fields(repair_id = %repair.id_typed(), state = repair.state().as_str()),
        err
    )]
    async fn save_repair(&mut self, repair: &Repair, expected: ExpectedVersion) -> StoreResult<()> {
        let record = repair.to_record().ok_or_else(|| {
            StoreError::MissingReference(format!("hardware of repair {}", repair.id_typed()))
        })?;
        let actual = self.locked_version("repairs", "id", *record.id.as_uuid()).await?;
        check_version("repair", record.id, expected, actual)?;

        sqlx::query(
            r#"
            INSERT INTO repairs (
                id, title, description, hardware_id, client_id, prepayment, repair_price,
                state, deposit_date, delivery_date, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                hardware_id = EXCLUDED.hardware_id,
                client_id = EXCLUDED.client_id,
                prepayment = EXCLUDED.prepayment,
                repair_price = EXCLUDED.repair_price,
                state = EXCLUDED.state,
                delivery_date = EXCLUDED.delivery_date,
                version = EXCLUDED.version
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(&record.title)
        .bind(&record.description)
        .bind(*record.hardware_id.as_uuid())
        .bind(record.client_id.map(|c| *c.as_uuid()))
        .bind(to_db(record.prepayment, "prepayment")?)
        .bind(to_db(record.repair_price, "repair_price")?)
        .bind(record.state.as_str())
        .bind(record.deposit_date)
        .bind(record.delivery_date)
        .bind(to_db(record.version, "version")?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_repair", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

async fn upsert_product(tx: &mut Transaction<'static, Postgres>, product: &Product) -> StoreResult<()> {
    let record = product
        .to_record()
        .ok_or_else(|| StoreError::MissingReference(format!("category of product {}", product.id_typed())))?;

    sqlx::query(
        r#"
        INSERT INTO products
            (id, name, category_id, description, initial_selling_price, status, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            category_id = EXCLUDED.category_id,
            description = EXCLUDED.description,
            initial_selling_price = EXCLUDED.initial_selling_price,
            status = EXCLUDED.status,
            version = EXCLUDED.version
        "#,
    )
    .bind(*record.id.as_uuid())
    .bind(&record.name)
    .bind(*record.category_id.as_uuid())
    .bind(&record.description)
    .bind(to_db(record.initial_selling_price, "initial_selling_price")?)
    .bind(record.status.as_str())
    .bind(to_db(record.version, "version")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_product", e))?;

    sqlx::query("DELETE FROM product_suppliers WHERE product_id = $1")
        .bind(*record.id.as_uuid())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("clear_product_suppliers", e))?;
    for supplier_id in &record.suppliers {
        sqlx::query("INSERT INTO product_suppliers (product_id, supplier_id) VALUES ($1, $2)")
            .bind(*record.id.as_uuid())
            .bind(*supplier_id.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_product_supplier", e))?;
    }
    Ok(())
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn to_db(value: u64, what: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Database(format!("{what} {value} does not fit in BIGINT")))
}

fn from_db(value: i64, what: &str) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {what}: {value}")))
}

fn position_to_db(position: usize) -> StoreResult<i32> {
    i32::try_from(position).map_err(|_| StoreError::Database(format!("line position {position} too large")))
}

fn role_from_row(row: &PgRow) -> StoreResult<Role> {
    let role: String = get(row, "role")?;
    Role::parse(&role).ok_or_else(|| StoreError::Corrupt(format!("unknown role {role:?}")))
}

fn account_from_row(row: &PgRow) -> StoreResult<AccountRecord> {
    Ok(AccountRecord {
        account_id: AccountId::from_uuid(get(row, "id")?),
        employee_id: get::<Option<Uuid>>(row, "employee_id")?.map(EmployeeId::from),
        role: role_from_row(row)?,
    })
}

fn employee_from_row(row: &PgRow) -> StoreResult<Employee> {
    Ok(Employee::restore(
        EmployeeId::from(get::<Uuid>(row, "id")?),
        get(row, "first_name")?,
        get(row, "last_name")?,
        contact_from_row(row)?,
        role_from_row(row)?,
        get::<Option<i64>>(row, "salary")?
            .map(|s| from_db(s, "salary"))
            .transpose()?,
        from_db(get(row, "version")?, "version")?,
    ))
}

fn contact_from_row(row: &PgRow) -> StoreResult<ContactInfo> {
    Ok(ContactInfo {
        phone: get(row, "phone")?,
        email: get(row, "email")?,
        address: get(row, "address")?,
    })
}

fn product_from_row(row: &PgRow, suppliers: BTreeSet<SupplierId>) -> StoreResult<Product> {
    let status: String = get(row, "status")?;
    Ok(Product::from_record(ProductRecord {
        id: ProductId::from(get::<Uuid>(row, "id")?),
        name: get(row, "name")?,
        category_id: CategoryId::from(get::<Uuid>(row, "category_id")?),
        description: get(row, "description")?,
        initial_selling_price: from_db(get(row, "initial_selling_price")?, "initial_selling_price")?,
        suppliers,
        status: ProductStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown product status {status:?}")))?,
        version: from_db(get(row, "version")?, "version")?,
    }))
}

fn hardware_from_row(row: &PgRow) -> StoreResult<HardwareToRepair> {
    let state: String = get(row, "state")?;
    Ok(HardwareToRepair::restore(
        HardwareId::from(get::<Uuid>(row, "id")?),
        get(row, "name")?,
        CategoryId::from(get::<Uuid>(row, "category_id")?),
        get(row, "description")?,
        HardwareState::parse(&state)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown hardware state {state:?}")))?,
    ))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::MissingReference(msg),
                Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}
