//! Catalog: categories, products and the sellable listing.

use chrono::Utc;
use tracing::{info, instrument};

use shopdesk_auth::{Action, Actor};
use shopdesk_catalog::{
    Category, CategoryId, CreateProduct, LinkSupplier, MarkProductForSale, MarkProductInRepair,
    Product, ProductCommand, ProductId, ProductStatus, UnlinkSupplier, UpdateProductDetails,
};
use shopdesk_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion};
use shopdesk_inventory::{StockEvent, StockLevel};
use shopdesk_parties::SupplierId;

use super::{Outbox, Services};
use crate::error::ServiceResult;

/// A product with its current on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductListing {
    pub product: Product,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub category_id: CategoryId,
    pub description: Option<String>,
    pub initial_selling_price: u64,
    pub initial_quantity: i64,
    pub suppliers: Vec<SupplierId>,
}

/// Product detail edits; `None` keeps the current value. Quantity is not here:
/// it only moves through the stock ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub category_id: Option<CategoryId>,
    pub description: Option<String>,
    pub initial_selling_price: Option<u64>,
}

impl Services {
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn create_category(&self, actor: &Actor, name: &str) -> ServiceResult<Category> {
        self.authorize(actor, Action::ManageCatalog)?;

        let category = Category::new(CategoryId::generate(), name)?;
        let mut uow = self.store.begin().await?;
        uow.insert_category(&category).await?;
        uow.commit().await?;
        Ok(category)
    }

    /// Create a product and open its stock at `initial_quantity`.
    #[instrument(skip(self, actor, new), fields(actor = %actor.account_id, name = %new.name), err)]
    pub async fn create_product(&self, actor: &Actor, new: NewProduct) -> ServiceResult<ProductListing> {
        self.authorize(actor, Action::ManageCatalog)?;

        let now = Utc::now();
        let product_id = ProductId::generate();
        let mut product = Product::empty(product_id);
        let product_events = product.execute(&ProductCommand::CreateProduct(CreateProduct {
            product_id,
            name: new.name,
            category_id: new.category_id,
            description: new.description,
            initial_selling_price: new.initial_selling_price,
            suppliers: new.suppliers.clone(),
            occurred_at: now,
        }))?;
        let (stock, opened) = StockLevel::open(product_id, new.initial_quantity, now)?;

        let mut uow = self.store.begin().await?;
        if uow.load_category(new.category_id).await?.is_none() {
            return Err(DomainError::validation(format!("unknown category {}", new.category_id)).into());
        }
        for supplier_id in &new.suppliers {
            if uow.load_supplier(*supplier_id).await?.is_none() {
                return Err(DomainError::validation(format!("unknown supplier {supplier_id}")).into());
            }
        }
        uow.insert_product(&product, &stock).await?;

        let mut outbox = Outbox::default();
        outbox.record(product_id.0, "catalog.product", &product_events)?;
        outbox.record(product_id.0, "inventory.stock", &[StockEvent::StockOpened(opened)])?;
        uow.commit().await?;
        self.publish(outbox);

        info!(product_id = %product_id, quantity = stock.quantity(), "product created");
        Ok(ProductListing {
            product,
            quantity: stock.quantity(),
        })
    }

    #[instrument(skip(self, actor, changes), fields(actor = %actor.account_id), err)]
    pub async fn update_product(
        &self,
        actor: &Actor,
        product_id: ProductId,
        changes: ProductChanges,
    ) -> ServiceResult<Product> {
        self.authorize(actor, Action::ManageCatalog)?;

        let mut uow = self.store.begin().await?;
        if let Some(category_id) = changes.category_id {
            if uow.load_category(category_id).await?.is_none() {
                return Err(DomainError::validation(format!("unknown category {category_id}")).into());
            }
        }
        self.change_product(
            uow,
            product_id,
            ProductCommand::UpdateProductDetails(UpdateProductDetails {
                product_id,
                name: changes.name,
                category_id: changes.category_id,
                description: changes.description,
                initial_selling_price: changes.initial_selling_price,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn link_supplier(
        &self,
        actor: &Actor,
        product_id: ProductId,
        supplier_id: SupplierId,
    ) -> ServiceResult<Product> {
        self.authorize(actor, Action::ManageCatalog)?;

        let mut uow = self.store.begin().await?;
        if uow.load_supplier(supplier_id).await?.is_none() {
            return Err(DomainError::not_found().into());
        }
        self.change_product(
            uow,
            product_id,
            ProductCommand::LinkSupplier(LinkSupplier {
                product_id,
                supplier_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn unlink_supplier(
        &self,
        actor: &Actor,
        product_id: ProductId,
        supplier_id: SupplierId,
    ) -> ServiceResult<Product> {
        self.authorize(actor, Action::ManageCatalog)?;

        let uow = self.store.begin().await?;
        self.change_product(
            uow,
            product_id,
            ProductCommand::UnlinkSupplier(UnlinkSupplier {
                product_id,
                supplier_id,
                occurred_at: Utc::now(),
            }),
        )
        .await
    }

    /// Take a product off the sellable listing (`InRepair`) or put it back.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn set_product_status(
        &self,
        actor: &Actor,
        product_id: ProductId,
        status: ProductStatus,
    ) -> ServiceResult<Product> {
        self.authorize(actor, Action::ManageCatalog)?;

        let occurred_at = Utc::now();
        let command = match status {
            ProductStatus::InRepair => ProductCommand::MarkProductInRepair(MarkProductInRepair {
                product_id,
                occurred_at,
            }),
            ProductStatus::ForSale => ProductCommand::MarkProductForSale(MarkProductForSale {
                product_id,
                occurred_at,
            }),
        };
        let uow = self.store.begin().await?;
        self.change_product(uow, product_id, command).await
    }

    /// Delete a product and its stock. Refused while any sale or purchase order
    /// line still references it.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn delete_product(&self, actor: &Actor, product_id: ProductId) -> ServiceResult<()> {
        self.authorize(actor, Action::ManageCatalog)?;

        let mut uow = self.store.begin().await?;
        let product = uow
            .load_product(product_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        if uow.product_in_use(product_id).await? {
            return Err(DomainError::conflict(format!(
                "product {} is still on a sale or purchase order",
                product.name()
            ))
            .into());
        }
        uow.delete_product(product_id, ExpectedVersion::Exact(product.version()))
            .await?;
        uow.commit().await?;

        info!(product_id = %product_id, "product deleted");
        Ok(())
    }

    /// Price a new sale line starts from.
    pub async fn suggested_sale_price(&self, product_id: ProductId) -> ServiceResult<u64> {
        let mut uow = self.store.begin().await?;
        let product = uow
            .load_product(product_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        Ok(product.initial_selling_price())
    }

    /// Products offered on new sale lines, with their quantities.
    #[instrument(skip(self), err)]
    pub async fn list_sellable_products(&self) -> ServiceResult<Vec<ProductListing>> {
        Ok(self
            .list_products()
            .await?
            .into_iter()
            .filter(|l| l.product.is_sellable())
            .collect())
    }

    #[instrument(skip(self), err)]
    pub async fn list_products(&self) -> ServiceResult<Vec<ProductListing>> {
        let mut uow = self.store.begin().await?;
        let rows = uow.list_products().await?;
        Ok(rows
            .into_iter()
            .map(|(product, quantity)| ProductListing { product, quantity })
            .collect())
    }

    async fn change_product(
        &self,
        mut uow: Box<dyn crate::store::UnitOfWork>,
        product_id: ProductId,
        command: ProductCommand,
    ) -> ServiceResult<Product> {
        let mut product = uow
            .load_product(product_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(product.version());

        let events = product.execute(&command)?;
        if events.is_empty() {
            return Ok(product);
        }
        uow.save_product(&product, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(product_id.0, "catalog.product", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use shopdesk_auth::Role;
    use shopdesk_catalog::ProductStatus;

    use super::*;
    use super::super::test_support::*;
    use crate::error::ServiceError;
    use crate::store::StoreError;

    #[tokio::test]
    async fn created_product_starts_with_its_initial_quantity() {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;

        let product_id = product(&services, &admin, category_id, "Charger", 10).await;

        assert_eq!(quantity(&services, product_id).await, 10);
    }

    #[tokio::test]
    async fn duplicate_product_names_are_rejected() {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;
        product(&services, &admin, category_id, "Charger", 1).await;

        let err = services
            .create_product(
                &admin,
                NewProduct {
                    name: "Charger".to_string(),
                    category_id,
                    description: None,
                    initial_selling_price: 5,
                    initial_quantity: 1,
                    suppliers: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Conflict(_))));
        assert!(err.is_user_facing());
    }

    #[tokio::test]
    async fn products_in_repair_leave_the_sellable_listing() {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;
        let listed = product(&services, &admin, category_id, "Charger", 3).await;
        let hidden = product(&services, &admin, category_id, "Laptop", 1).await;

        services
            .set_product_status(&admin, hidden, ProductStatus::InRepair)
            .await
            .unwrap();

        let sellable = services.list_sellable_products().await.unwrap();
        assert_eq!(sellable.len(), 1);
        assert_eq!(sellable[0].product.id_typed(), listed);
        assert_eq!(sellable[0].quantity, 3);
    }

    #[tokio::test]
    async fn repairers_cannot_edit_the_catalog() {
        let services = services();
        let admin = admin(&services).await;
        let repairer = member(&services, &admin, Role::Repairer).await;

        let err = services.create_category(&repairer, "Phones").await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn product_details_change_without_touching_stock() {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;
        let product_id = product(&services, &admin, category_id, "Charger", 4).await;

        let updated = services
            .update_product(
                &admin,
                product_id,
                ProductChanges {
                    name: Some("USB-C Charger".to_string()),
                    ..ProductChanges::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name(), "USB-C Charger");
        assert_eq!(quantity(&services, product_id).await, 4);
    }

    #[tokio::test]
    async fn a_product_on_a_sale_cannot_be_deleted() {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;
        let product_id = product(&services, &admin, category_id, "Charger", 4).await;
        let sale_id = services.create_sale(&admin, None).await.unwrap().id_typed();
        services
            .add_or_update_sale_item(&admin, sale_id, product_id, 1, 900)
            .await
            .unwrap();

        let err = services.delete_product(&admin, product_id).await.unwrap_err();

        assert!(matches!(err, ServiceError::Domain(DomainError::Conflict(_))));
        assert_eq!(quantity(&services, product_id).await, 3);
    }

    #[tokio::test]
    async fn an_unused_product_is_deleted_with_its_stock() {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;
        let kept = product(&services, &admin, category_id, "Charger", 4).await;
        let dropped = product(&services, &admin, category_id, "Cable", 2).await;

        services.delete_product(&admin, dropped).await.unwrap();

        let listed = services.list_products().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].product.id_typed(), kept);
        let err = services.suggested_sale_price(dropped).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound)));
    }

    #[tokio::test]
    async fn new_lines_are_priced_from_the_initial_selling_price() {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;
        let product_id = product(&services, &admin, category_id, "Charger", 4).await;

        assert_eq!(services.suggested_sale_price(product_id).await.unwrap(), 1_000);
    }
}
