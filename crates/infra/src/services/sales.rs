//! Sales: the sale editor and cancellation, both moving stock in the same unit
//! of work as the sale.

use chrono::Utc;
use tracing::{debug, info, instrument};

use shopdesk_auth::{Action, Actor};
use shopdesk_catalog::ProductId;
use shopdesk_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion};
use shopdesk_parties::ClientId;
use shopdesk_sales::{
    AssignClient, CreateSale, Sale, SaleCommand, SaleEditBatch, SaleEvent, SaleId, cancel_sale,
};

use super::{LockedStocks, Outbox, Services};
use crate::error::ServiceResult;

/// One submitted edit of a sale's lines. Applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleEditRequest {
    pub sale_id: SaleId,
    pub lines: Vec<SaleLineChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleLineChange {
    /// Add the product to the sale, or change its existing line. Without a
    /// price the line takes the product's initial selling price.
    Upsert {
        product_id: ProductId,
        quantity: i64,
        sale_price: Option<u64>,
    },
    Remove { product_id: ProductId },
}

impl SaleLineChange {
    fn product_id(&self) -> ProductId {
        match self {
            SaleLineChange::Upsert { product_id, .. } | SaleLineChange::Remove { product_id } => *product_id,
        }
    }
}

impl Services {
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn create_sale(&self, actor: &Actor, client_id: Option<ClientId>) -> ServiceResult<Sale> {
        self.authorize(actor, Action::ManageSales)?;

        let sale_id = SaleId::generate();
        let mut sale = Sale::empty(sale_id);
        let events = sale.execute(&SaleCommand::CreateSale(CreateSale {
            sale_id,
            client_id,
            occurred_at: Utc::now(),
        }))?;

        let mut uow = self.store.begin().await?;
        if let Some(client_id) = client_id {
            if uow.load_client(client_id).await?.is_none() {
                return Err(DomainError::validation(format!("unknown client {client_id}")).into());
            }
        }
        uow.save_sale(&sale, ExpectedVersion::Exact(0)).await?;

        let mut outbox = Outbox::default();
        outbox.record(sale_id.0, "sales.sale", &events)?;
        uow.commit().await?;
        self.publish(outbox);

        info!(sale_id = %sale_id, "sale created");
        Ok(sale)
    }

    /// Apply a whole submission to a sale's lines.
    ///
    /// Lines are processed in ascending product order and every touched stock
    /// level is locked up front. The first failing line aborts the submission:
    /// neither the sale nor any stock level changes.
    #[instrument(skip(self, actor, request), fields(actor = %actor.account_id, sale_id = %request.sale_id), err)]
    pub async fn edit_sale(&self, actor: &Actor, request: SaleEditRequest) -> ServiceResult<Sale> {
        self.authorize(actor, Action::ManageSales)?;

        let SaleEditRequest { sale_id, mut lines } = request;
        lines.sort_by_key(SaleLineChange::product_id);

        let mut uow = self.store.begin().await?;
        let mut sale = uow.load_sale(sale_id).await?.ok_or_else(DomainError::not_found)?;
        let sale_loaded_at = sale.version();
        let mut stocks = LockedStocks::lock_all(&mut uow, lines.iter().map(SaleLineChange::product_id)).await?;

        let now = Utc::now();
        let mut batch = SaleEditBatch::new(sale_id);
        let mut events: Vec<SaleEvent> = Vec::new();
        let mut movements = Vec::new();
        for line in &lines {
            let outcome = match line {
                SaleLineChange::Upsert {
                    product_id,
                    quantity,
                    sale_price,
                } => {
                    let product = uow
                        .load_product(*product_id)
                        .await?
                        .ok_or_else(|| DomainError::validation(format!("unknown product {product_id}")))?;
                    let sale_price = sale_price.unwrap_or_else(|| product.initial_selling_price());
                    let stock = stocks.get_mut(*product_id)?;
                    batch.add_or_update_item(&mut sale, &product, stock, *quantity, sale_price, now)?
                }
                SaleLineChange::Remove { product_id } => {
                    let stock = stocks.get_mut(*product_id)?;
                    batch.remove_item(&mut sale, stock, now)?
                }
            };
            events.extend(outcome.events);
            movements.extend(outcome.movement);
        }

        if events.is_empty() {
            debug!("sale edit changed nothing");
            return Ok(sale);
        }
        stocks.save_changed(&mut uow).await?;
        uow.save_sale(&sale, ExpectedVersion::Exact(sale_loaded_at)).await?;

        let mut outbox = Outbox::default();
        outbox.record(sale_id.0, "sales.sale", &events)?;
        outbox.record_movements(movements)?;
        uow.commit().await?;
        self.publish(outbox);

        info!(lines = lines.len(), total = sale.total(), "sale edited");
        Ok(sale)
    }

    pub async fn add_or_update_sale_item(
        &self,
        actor: &Actor,
        sale_id: SaleId,
        product_id: ProductId,
        quantity: i64,
        sale_price: u64,
    ) -> ServiceResult<Sale> {
        self.edit_sale(
            actor,
            SaleEditRequest {
                sale_id,
                lines: vec![SaleLineChange::Upsert {
                    product_id,
                    quantity,
                    sale_price: Some(sale_price),
                }],
            },
        )
        .await
    }

    pub async fn remove_sale_item(&self, actor: &Actor, sale_id: SaleId, product_id: ProductId) -> ServiceResult<Sale> {
        self.edit_sale(
            actor,
            SaleEditRequest {
                sale_id,
                lines: vec![SaleLineChange::Remove { product_id }],
            },
        )
        .await
    }

    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn set_sale_client(
        &self,
        actor: &Actor,
        sale_id: SaleId,
        client_id: Option<ClientId>,
    ) -> ServiceResult<Sale> {
        self.authorize(actor, Action::ManageSales)?;

        let mut uow = self.store.begin().await?;
        let mut sale = uow.load_sale(sale_id).await?.ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(sale.version());
        if let Some(client_id) = client_id {
            if uow.load_client(client_id).await?.is_none() {
                return Err(DomainError::validation(format!("unknown client {client_id}")).into());
            }
        }

        let events = sale.execute(&SaleCommand::AssignClient(AssignClient {
            sale_id,
            client_id,
            occurred_at: Utc::now(),
        }))?;
        if events.is_empty() {
            return Ok(sale);
        }
        uow.save_sale(&sale, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(sale_id.0, "sales.sale", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(sale)
    }

    /// Cancel a sale: every line goes back to stock and the sale is deleted.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn cancel_sale(&self, actor: &Actor, sale_id: SaleId) -> ServiceResult<()> {
        self.authorize(actor, Action::ManageSales)?;

        let mut uow = self.store.begin().await?;
        let mut sale = uow.load_sale(sale_id).await?.ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(sale.version());
        let mut stocks = LockedStocks::lock_all(&mut uow, sale.items().iter().map(|i| i.product_id)).await?;

        let cancellation = cancel_sale(&mut sale, &mut stocks.levels, Utc::now())?;
        stocks.save_changed(&mut uow).await?;
        uow.delete_sale(sale_id, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(sale_id.0, "sales.sale", &cancellation.events)?;
        outbox.record_movements(cancellation.movements)?;
        uow.commit().await?;
        self.publish(outbox);

        info!(sale_id = %sale_id, "sale canceled");
        Ok(())
    }

    pub async fn get_sale(&self, sale_id: SaleId) -> ServiceResult<Option<Sale>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.load_sale(sale_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::test_support::*;
    use shopdesk_auth::Role;

    async fn fixture(quantity: i64) -> (Services, Actor, ProductId, SaleId) {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;
        let product_id = product(&services, &admin, category_id, "USB-C charger", quantity).await;
        let sale_id = services.create_sale(&admin, None).await.unwrap().id_typed();
        (services, admin, product_id, sale_id)
    }

    #[tokio::test]
    async fn add_update_remove_moves_stock() {
        let (services, admin, product_id, sale_id) = fixture(10).await;

        services
            .add_or_update_sale_item(&admin, sale_id, product_id, 4, 1_000)
            .await
            .unwrap();
        assert_eq!(quantity(&services, product_id).await, 6);

        let sale = services
            .add_or_update_sale_item(&admin, sale_id, product_id, 7, 1_000)
            .await
            .unwrap();
        assert_eq!(quantity(&services, product_id).await, 3);
        assert_eq!(sale.items()[0].quantity, 7);

        let sale = services.remove_sale_item(&admin, sale_id, product_id).await.unwrap();
        assert_eq!(quantity(&services, product_id).await, 10);
        assert!(sale.items().is_empty());
    }

    #[tokio::test]
    async fn overselling_is_rejected_and_stock_stays() {
        let (services, admin, product_id, sale_id) = fixture(2).await;

        let err = services
            .add_or_update_sale_item(&admin, sale_id, product_id, 3, 1_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InsufficientStock { available: 2, requested: 3, .. })
        ));
        assert_eq!(quantity(&services, product_id).await, 2);
        assert!(services.get_sale(sale_id).await.unwrap().unwrap().items().is_empty());
    }

    #[tokio::test]
    async fn a_product_submitted_twice_rolls_back_the_whole_edit() {
        let (services, admin, product_id, sale_id) = fixture(10).await;
        let category_id = category(&services, &admin).await;
        let other = product(&services, &admin, category_id, "HDMI cable", 5).await;

        let err = services
            .edit_sale(
                &admin,
                SaleEditRequest {
                    sale_id,
                    lines: vec![
                        SaleLineChange::Upsert {
                            product_id: other,
                            quantity: 1,
                            sale_price: Some(500),
                        },
                        SaleLineChange::Upsert {
                            product_id,
                            quantity: 2,
                            sale_price: Some(1_000),
                        },
                        SaleLineChange::Upsert {
                            product_id,
                            quantity: 3,
                            sale_price: Some(1_000),
                        },
                    ],
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Domain(DomainError::DuplicateProductInSale(_))));
        assert_eq!(quantity(&services, product_id).await, 10);
        assert_eq!(quantity(&services, other).await, 5);
        assert!(services.get_sale(sale_id).await.unwrap().unwrap().items().is_empty());
    }

    #[tokio::test]
    async fn canceling_returns_every_line_to_stock() {
        let (services, admin, product_id, sale_id) = fixture(10).await;
        services
            .add_or_update_sale_item(&admin, sale_id, product_id, 4, 1_000)
            .await
            .unwrap();

        services.cancel_sale(&admin, sale_id).await.unwrap();

        assert_eq!(quantity(&services, product_id).await, 10);
        assert!(services.get_sale(sale_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_edits_are_published() {
        let (services, admin, product_id, sale_id) = fixture(10).await;
        let subscription = services.subscribe();

        services
            .add_or_update_sale_item(&admin, sale_id, product_id, 1, 1_000)
            .await
            .unwrap();

        let types: Vec<String> = subscription
            .drain()
            .iter()
            .map(|e| e.aggregate_type().to_string())
            .collect();
        assert_eq!(types, vec!["sales.sale", "inventory.stock"]);
    }

    #[tokio::test]
    async fn a_rejected_edit_publishes_nothing() {
        let (services, admin, product_id, sale_id) = fixture(2).await;
        let subscription = services.subscribe();

        let err = services
            .add_or_update_sale_item(&admin, sale_id, product_id, 5, 1_000)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Domain(DomainError::InsufficientStock { .. })));
        assert!(subscription.drain().is_empty());
    }

    #[tokio::test]
    async fn repairers_cannot_touch_sales() {
        let (services, admin, product_id, sale_id) = fixture(10).await;
        let repairer = member(&services, &admin, Role::Repairer).await;

        let err = services
            .add_or_update_sale_item(&repairer, sale_id, product_id, 1, 1_000)
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::PermissionDenied(_)));
        assert_eq!(quantity(&services, product_id).await, 10);
    }

    #[tokio::test]
    async fn a_line_without_a_price_takes_the_initial_selling_price() {
        let (services, admin, product_id, sale_id) = fixture(10).await;

        let sale = services
            .edit_sale(
                &admin,
                SaleEditRequest {
                    sale_id,
                    lines: vec![SaleLineChange::Upsert {
                        product_id,
                        quantity: 2,
                        sale_price: None,
                    }],
                },
            )
            .await
            .unwrap();

        assert_eq!(sale.items()[0].sale_price, 1_000);
        assert_eq!(sale.total(), 2_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_edits_cannot_oversell_the_same_stock() {
        let (services, admin, product_id, first) = fixture(5).await;
        let second = services.create_sale(&admin, None).await.unwrap().id_typed();
        let take_three = |sale_id| SaleEditRequest {
            sale_id,
            lines: vec![SaleLineChange::Upsert {
                product_id,
                quantity: 3,
                sale_price: Some(1_000),
            }],
        };

        let (a, b) = tokio::join!(
            services.edit_sale(&admin, take_three(first)),
            services.edit_sale(&admin, take_three(second)),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(
                    r,
                    Err(ServiceError::Domain(DomainError::InsufficientStock { available: 2, requested: 3, .. }))
                ))
                .count(),
            1
        );
        assert_eq!(quantity(&services, product_id).await, 2);
    }
}
