//! Purchasing: order editing, delivery into stock, and discarding.

use chrono::Utc;
use tracing::{info, instrument};

use shopdesk_auth::{Action, Actor};
use shopdesk_catalog::ProductId;
use shopdesk_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion};
use shopdesk_parties::SupplierId;
use shopdesk_purchasing::{
    AssignSupplier, CreatePurchaseOrder, DiscardOrder, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderEditBatch, PurchaseOrderEvent, PurchaseOrderId, deliver_order,
};

use super::{LockedStocks, Outbox, Services};
use crate::error::ServiceResult;

/// One submitted edit of an order's lines. Applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrderEditRequest {
    pub order_id: PurchaseOrderId,
    pub lines: Vec<PurchaseOrderLineChange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOrderLineChange {
    Upsert {
        product_id: ProductId,
        quantity: i64,
        purchase_price: Option<u64>,
    },
    Remove { product_id: ProductId },
}

impl PurchaseOrderLineChange {
    fn product_id(&self) -> ProductId {
        match self {
            PurchaseOrderLineChange::Upsert { product_id, .. } | PurchaseOrderLineChange::Remove { product_id } => {
                *product_id
            }
        }
    }
}

impl Services {
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn create_purchase_order(
        &self,
        actor: &Actor,
        supplier_id: Option<SupplierId>,
    ) -> ServiceResult<PurchaseOrder> {
        self.authorize(actor, Action::ManagePurchasing)?;

        let order_id = PurchaseOrderId::generate();
        let mut order = PurchaseOrder::empty(order_id);
        let events = order.execute(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id,
            supplier_id,
            occurred_at: Utc::now(),
        }))?;

        let mut uow = self.store.begin().await?;
        if let Some(supplier_id) = supplier_id {
            if uow.load_supplier(supplier_id).await?.is_none() {
                return Err(DomainError::validation(format!("unknown supplier {supplier_id}")).into());
            }
        }
        uow.save_purchase_order(&order, ExpectedVersion::Exact(0)).await?;

        let mut outbox = Outbox::default();
        outbox.record(order_id.0, "purchasing.order", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(order)
    }

    /// Apply a whole submission to a pending order's lines.
    ///
    /// Pending lines carry no stock effect, so nothing is locked besides the
    /// order row itself.
    #[instrument(skip(self, actor, request), fields(actor = %actor.account_id, order_id = %request.order_id), err)]
    pub async fn edit_purchase_order(
        &self,
        actor: &Actor,
        request: PurchaseOrderEditRequest,
    ) -> ServiceResult<PurchaseOrder> {
        self.authorize(actor, Action::ManagePurchasing)?;

        let PurchaseOrderEditRequest { order_id, mut lines } = request;
        lines.sort_by_key(PurchaseOrderLineChange::product_id);

        let mut uow = self.store.begin().await?;
        let mut order = uow
            .load_purchase_order(order_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(order.version());

        let now = Utc::now();
        let mut batch = PurchaseOrderEditBatch::new(order_id);
        let mut events: Vec<PurchaseOrderEvent> = Vec::new();
        for line in &lines {
            let outcome = match line {
                PurchaseOrderLineChange::Upsert {
                    product_id,
                    quantity,
                    purchase_price,
                } => {
                    if uow.load_product(*product_id).await?.is_none() {
                        return Err(DomainError::validation(format!("unknown product {product_id}")).into());
                    }
                    batch.add_or_update_item(&mut order, *product_id, *quantity, *purchase_price, now)?
                }
                PurchaseOrderLineChange::Remove { product_id } => batch.remove_item(&mut order, *product_id, now)?,
            };
            events.extend(outcome.events);
        }

        if events.is_empty() {
            return Ok(order);
        }
        uow.save_purchase_order(&order, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(order_id.0, "purchasing.order", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(order)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn set_order_supplier(
        &self,
        actor: &Actor,
        order_id: PurchaseOrderId,
        supplier_id: Option<SupplierId>,
    ) -> ServiceResult<PurchaseOrder> {
        self.authorize(actor, Action::ManagePurchasing)?;

        let mut uow = self.store.begin().await?;
        let mut order = uow
            .load_purchase_order(order_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(order.version());
        if let Some(supplier_id) = supplier_id {
            if uow.load_supplier(supplier_id).await?.is_none() {
                return Err(DomainError::validation(format!("unknown supplier {supplier_id}")).into());
            }
        }

        let events = order.execute(&PurchaseOrderCommand::AssignSupplier(AssignSupplier {
            order_id,
            supplier_id,
            occurred_at: Utc::now(),
        }))?;
        if events.is_empty() {
            return Ok(order);
        }
        uow.save_purchase_order(&order, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(order_id.0, "purchasing.order", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(order)
    }

    /// Receive every line into stock and stamp the delivery date.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn deliver_purchase_order(
        &self,
        actor: &Actor,
        order_id: PurchaseOrderId,
    ) -> ServiceResult<PurchaseOrder> {
        self.authorize(actor, Action::ManagePurchasing)?;

        let mut uow = self.store.begin().await?;
        let mut order = uow
            .load_purchase_order(order_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(order.version());

        let mut stocks = LockedStocks::lock_all(&mut uow, order.items().iter().map(|i| i.product_id)).await?;

        let delivery = deliver_order(&mut order, &mut stocks.levels, Utc::now())?;
        stocks.save_changed(&mut uow).await?;
        uow.save_purchase_order(&order, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(order_id.0, "purchasing.order", &delivery.events)?;
        outbox.record_movements(delivery.movements)?;
        uow.commit().await?;
        self.publish(outbox);

        info!(order_id = %order_id, lines = order.items().len(), "purchase order delivered");
        Ok(order)
    }

    /// Delete a pending order. Delivered orders stay.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn discard_purchase_order(&self, actor: &Actor, order_id: PurchaseOrderId) -> ServiceResult<()> {
        self.authorize(actor, Action::ManagePurchasing)?;

        let mut uow = self.store.begin().await?;
        let mut order = uow
            .load_purchase_order(order_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(order.version());

        let events = order.execute(&PurchaseOrderCommand::DiscardOrder(DiscardOrder {
            order_id,
            occurred_at: Utc::now(),
        }))?;
        uow.delete_purchase_order(order_id, expected).await?;

        let mut outbox = Outbox::default();
        outbox.record(order_id.0, "purchasing.order", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(())
    }

    pub async fn get_purchase_order(&self, order_id: PurchaseOrderId) -> ServiceResult<Option<PurchaseOrder>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.load_purchase_order(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::test_support::*;

    async fn order_with_line(quantity: i64) -> (Services, Actor, ProductId, PurchaseOrderId) {
        let services = services();
        let admin = admin(&services).await;
        let category_id = category(&services, &admin).await;
        let product_id = product(&services, &admin, category_id, "Screen protector", 5).await;
        let supplier = services.register_supplier(&admin, "Parts Co", contact(1)).await.unwrap();
        let order_id = services
            .create_purchase_order(&admin, Some(supplier.id_typed()))
            .await
            .unwrap()
            .id_typed();
        services
            .edit_purchase_order(
                &admin,
                PurchaseOrderEditRequest {
                    order_id,
                    lines: vec![PurchaseOrderLineChange::Upsert {
                        product_id,
                        quantity,
                        purchase_price: Some(300),
                    }],
                },
            )
            .await
            .unwrap();
        (services, admin, product_id, order_id)
    }

    #[tokio::test]
    async fn delivery_adds_every_line_to_stock() {
        let (services, admin, product_id, order_id) = order_with_line(20).await;

        let order = services.deliver_purchase_order(&admin, order_id).await.unwrap();

        assert!(order.delivery_date().is_some());
        assert_eq!(quantity(&services, product_id).await, 25);
    }

    #[tokio::test]
    async fn an_order_is_received_only_once() {
        let (services, admin, product_id, order_id) = order_with_line(20).await;
        services.deliver_purchase_order(&admin, order_id).await.unwrap();

        let err = services.deliver_purchase_order(&admin, order_id).await.unwrap_err();

        assert!(matches!(err, ServiceError::Domain(DomainError::AlreadyDelivered)));
        assert_eq!(quantity(&services, product_id).await, 25);
    }

    #[tokio::test]
    async fn delivered_lines_are_frozen() {
        let (services, admin, product_id, order_id) = order_with_line(20).await;
        services.deliver_purchase_order(&admin, order_id).await.unwrap();

        let err = services
            .edit_purchase_order(
                &admin,
                PurchaseOrderEditRequest {
                    order_id,
                    lines: vec![PurchaseOrderLineChange::Upsert {
                        product_id,
                        quantity: 30,
                        purchase_price: Some(300),
                    }],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::OrderAlreadyDelivered)));

        let err = services
            .edit_purchase_order(
                &admin,
                PurchaseOrderEditRequest {
                    order_id,
                    lines: vec![PurchaseOrderLineChange::Remove { product_id }],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::OrderAlreadyDelivered)));

        let err = services.discard_purchase_order(&admin, order_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::OrderAlreadyDelivered)));
    }

    #[tokio::test]
    async fn an_empty_order_cannot_be_delivered() {
        let services = services();
        let admin = admin(&services).await;
        let order_id = services.create_purchase_order(&admin, None).await.unwrap().id_typed();

        let err = services.deliver_purchase_order(&admin, order_id).await.unwrap_err();

        assert!(matches!(err, ServiceError::Domain(DomainError::Validation(_))));
        assert!(!services.get_purchase_order(order_id).await.unwrap().unwrap().is_delivered());
    }

    #[tokio::test]
    async fn discarding_a_pending_order_leaves_stock_alone() {
        let (services, admin, product_id, order_id) = order_with_line(20).await;

        services.discard_purchase_order(&admin, order_id).await.unwrap();

        assert!(services.get_purchase_order(order_id).await.unwrap().is_none());
        assert_eq!(quantity(&services, product_id).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_deliveries_credit_stock_once() {
        let (services, admin, product_id, order_id) = order_with_line(20).await;

        let (a, b) = tokio::join!(
            services.deliver_purchase_order(&admin, order_id),
            services.deliver_purchase_order(&admin, order_id),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|r| matches!(r, Err(ServiceError::Domain(DomainError::AlreadyDelivered))))
                .count(),
            1
        );
        assert_eq!(quantity(&services, product_id).await, 25);
    }
}
