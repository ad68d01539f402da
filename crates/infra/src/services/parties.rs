//! Clients and suppliers.
//!
//! Deleting a party keeps the sales, repairs and purchase orders that named it;
//! they lose the reference instead.

use chrono::Utc;
use tracing::{info, instrument};

use shopdesk_auth::{Action, Actor};
use shopdesk_catalog::{ProductCommand, UnlinkSupplier};
use shopdesk_core::{Aggregate, AggregateRoot, DomainError, ExpectedVersion};
use shopdesk_parties::{
    Client, ClientCommand, ClientId, ContactInfo, RegisterClient, RegisterSupplier, Supplier,
    SupplierCommand, SupplierId, UpdateClient, UpdateSupplier,
};
use shopdesk_purchasing::{DetachSupplier, PurchaseOrderCommand};
use shopdesk_repairs::{DetachClient, RepairCommand};
use shopdesk_sales::{AssignClient, SaleCommand};

use super::{Outbox, Services};
use crate::error::ServiceResult;

impl Services {
    #[instrument(skip(self, actor, contact), fields(actor = %actor.account_id), err)]
    pub async fn register_client(
        &self,
        actor: &Actor,
        first_name: &str,
        last_name: &str,
        contact: ContactInfo,
    ) -> ServiceResult<Client> {
        self.authorize(actor, Action::ManageParties)?;

        let client_id = ClientId::generate();
        let mut client = Client::empty(client_id);
        let events = client.execute(&ClientCommand::RegisterClient(RegisterClient {
            client_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            contact,
            occurred_at: Utc::now(),
        }))?;

        let mut uow = self.store.begin().await?;
        uow.save_client(&client, ExpectedVersion::Exact(0)).await?;
        let mut outbox = Outbox::default();
        outbox.record(client_id.0, "parties.client", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(client)
    }

    #[instrument(skip(self, actor, contact), fields(actor = %actor.account_id), err)]
    pub async fn update_client(
        &self,
        actor: &Actor,
        client_id: ClientId,
        first_name: Option<String>,
        last_name: Option<String>,
        contact: Option<ContactInfo>,
    ) -> ServiceResult<Client> {
        self.authorize(actor, Action::ManageParties)?;

        let mut uow = self.store.begin().await?;
        let mut client = uow
            .load_client(client_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(client.version());
        let events = client.execute(&ClientCommand::UpdateClient(UpdateClient {
            client_id,
            first_name,
            last_name,
            contact,
            occurred_at: Utc::now(),
        }))?;
        if events.is_empty() {
            return Ok(client);
        }

        uow.save_client(&client, expected).await?;
        let mut outbox = Outbox::default();
        outbox.record(client_id.0, "parties.client", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(client)
    }

    pub async fn get_client(&self, client_id: ClientId) -> ServiceResult<Option<Client>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.load_client(client_id).await?)
    }

    /// Delete a client. Its sales and repairs stay, without a client.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn delete_client(&self, actor: &Actor, client_id: ClientId) -> ServiceResult<()> {
        self.authorize(actor, Action::ManageParties)?;

        let mut uow = self.store.begin().await?;
        let client = uow
            .load_client(client_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let occurred_at = Utc::now();
        let mut outbox = Outbox::default();

        for sale_id in uow.sales_of_client(client_id).await? {
            let mut sale = uow.load_sale(sale_id).await?.ok_or_else(DomainError::not_found)?;
            let expected = ExpectedVersion::Exact(sale.version());
            let events = sale.execute(&SaleCommand::AssignClient(AssignClient {
                sale_id,
                client_id: None,
                occurred_at,
            }))?;
            uow.save_sale(&sale, expected).await?;
            outbox.record(sale_id.0, "sales.sale", &events)?;
        }
        for repair_id in uow.repairs_of_client(client_id).await? {
            let mut repair = uow.load_repair(repair_id).await?.ok_or_else(DomainError::not_found)?;
            let expected = ExpectedVersion::Exact(repair.version());
            let events = repair.execute(&RepairCommand::DetachClient(DetachClient {
                repair_id,
                occurred_at,
            }))?;
            uow.save_repair(&repair, expected).await?;
            outbox.record(repair_id.0, "repairs.repair", &events)?;
        }

        uow.delete_client(client_id, ExpectedVersion::Exact(client.version()))
            .await?;
        uow.commit().await?;
        self.publish(outbox);
        info!(client_id = %client_id, "client deleted");
        Ok(())
    }

    #[instrument(skip(self, actor, contact), fields(actor = %actor.account_id), err)]
    pub async fn register_supplier(
        &self,
        actor: &Actor,
        name: &str,
        contact: ContactInfo,
    ) -> ServiceResult<Supplier> {
        self.authorize(actor, Action::ManageParties)?;

        let supplier_id = SupplierId::generate();
        let mut supplier = Supplier::empty(supplier_id);
        let events = supplier.execute(&SupplierCommand::RegisterSupplier(RegisterSupplier {
            supplier_id,
            name: name.to_string(),
            contact,
            occurred_at: Utc::now(),
        }))?;

        let mut uow = self.store.begin().await?;
        uow.save_supplier(&supplier, ExpectedVersion::Exact(0)).await?;
        let mut outbox = Outbox::default();
        outbox.record(supplier_id.0, "parties.supplier", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(supplier)
    }

    #[instrument(skip(self, actor, contact), fields(actor = %actor.account_id), err)]
    pub async fn update_supplier(
        &self,
        actor: &Actor,
        supplier_id: SupplierId,
        name: Option<String>,
        contact: Option<ContactInfo>,
    ) -> ServiceResult<Supplier> {
        self.authorize(actor, Action::ManageParties)?;

        let mut uow = self.store.begin().await?;
        let mut supplier = uow
            .load_supplier(supplier_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let expected = ExpectedVersion::Exact(supplier.version());
        let events = supplier.execute(&SupplierCommand::UpdateSupplier(UpdateSupplier {
            supplier_id,
            name,
            contact,
            occurred_at: Utc::now(),
        }))?;
        if events.is_empty() {
            return Ok(supplier);
        }

        uow.save_supplier(&supplier, expected).await?;
        let mut outbox = Outbox::default();
        outbox.record(supplier_id.0, "parties.supplier", &events)?;
        uow.commit().await?;
        self.publish(outbox);
        Ok(supplier)
    }

    pub async fn get_supplier(&self, supplier_id: SupplierId) -> ServiceResult<Option<Supplier>> {
        let mut uow = self.store.begin().await?;
        Ok(uow.load_supplier(supplier_id).await?)
    }

    /// Delete a supplier. Its purchase orders stay, delivered ones included,
    /// and its products drop the link.
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn delete_supplier(&self, actor: &Actor, supplier_id: SupplierId) -> ServiceResult<()> {
        self.authorize(actor, Action::ManageParties)?;

        let mut uow = self.store.begin().await?;
        let supplier = uow
            .load_supplier(supplier_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let occurred_at = Utc::now();
        let mut outbox = Outbox::default();

        for order_id in uow.orders_of_supplier(supplier_id).await? {
            let mut order = uow
                .load_purchase_order(order_id)
                .await?
                .ok_or_else(DomainError::not_found)?;
            let expected = ExpectedVersion::Exact(order.version());
            let events = order.execute(&PurchaseOrderCommand::DetachSupplier(DetachSupplier {
                order_id,
                occurred_at,
            }))?;
            uow.save_purchase_order(&order, expected).await?;
            outbox.record(order_id.0, "purchasing.order", &events)?;
        }
        for product_id in uow.products_of_supplier(supplier_id).await? {
            let mut product = uow.load_product(product_id).await?.ok_or_else(DomainError::not_found)?;
            let expected = ExpectedVersion::Exact(product.version());
            let events = product.execute(&ProductCommand::UnlinkSupplier(UnlinkSupplier {
                product_id,
                supplier_id,
                occurred_at,
            }))?;
            uow.save_product(&product, expected).await?;
            outbox.record(product_id.0, "catalog.product", &events)?;
        }

        uow.delete_supplier(supplier_id, ExpectedVersion::Exact(supplier.version()))
            .await?;
        uow.commit().await?;
        self.publish(outbox);
        info!(supplier_id = %supplier_id, "supplier deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shopdesk_auth::Role;
    use shopdesk_repairs::{RepairDetails, RepairState};

    use super::*;
    use super::super::test_support::*;
    use crate::error::ServiceError;
    use crate::services::{NewProduct, PurchaseOrderEditRequest, PurchaseOrderLineChange};
    use crate::store::StoreError;

    #[tokio::test]
    async fn client_phone_numbers_are_unique() {
        let services = services();
        let admin = admin(&services).await;
        services
            .register_client(&admin, "Ana", "Lopez", contact(1))
            .await
            .unwrap();

        let mut same_phone = contact(2);
        same_phone.phone = contact(1).phone;
        let err = services
            .register_client(&admin, "Bea", "Ruiz", same_phone)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn repairers_manage_parties_but_not_the_catalog() {
        let services = services();
        let admin = admin(&services).await;
        let repairer = member(&services, &admin, Role::Repairer).await;

        assert!(services.register_client(&repairer, "Ana", "Lopez", contact(1)).await.is_ok());
        assert!(services
            .register_supplier(&repairer, "Parts Co", contact(2))
            .await
            .is_ok());
        let employee_only = services.create_category(&repairer, "Phones").await;
        assert!(matches!(employee_only, Err(ServiceError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn updating_a_client_keeps_other_fields() {
        let services = services();
        let admin = admin(&services).await;
        let client = services
            .register_client(&admin, "Ana", "Lopez", contact(1))
            .await
            .unwrap();

        let updated = services
            .update_client(&admin, client.id_typed(), None, Some("Garcia".to_string()), None)
            .await
            .unwrap();

        assert_eq!(updated.first_name(), "Ana");
        assert_eq!(updated.last_name(), "Garcia");
        let stored = services.get_client(client.id_typed()).await.unwrap().unwrap();
        assert_eq!(stored.full_name(), "Ana Garcia");
    }

    #[tokio::test]
    async fn deleting_a_client_keeps_its_sales_and_repairs() {
        let services = services();
        let admin = admin(&services).await;
        let client_id = services
            .register_client(&admin, "Ana", "Lopez", contact(1))
            .await
            .unwrap()
            .id_typed();
        let sale = services.create_sale(&admin, Some(client_id)).await.unwrap();
        let category_id = category(&services, &admin).await;
        let hardware = services
            .register_hardware(&admin, "Pixel 7", category_id, "")
            .await
            .unwrap();
        let repair = services
            .open_repair(
                &admin,
                hardware.id_typed(),
                RepairDetails {
                    title: None,
                    description: "cracked screen".to_string(),
                    client_id: Some(client_id),
                    prepayment: 0,
                    repair_price: 50,
                },
            )
            .await
            .unwrap();
        services.finish_repair(&admin, repair.id_typed()).await.unwrap();
        services.pay_repair(&admin, repair.id_typed()).await.unwrap();

        services.delete_client(&admin, client_id).await.unwrap();

        assert!(services.get_client(client_id).await.unwrap().is_none());
        let sale = services.get_sale(sale.id_typed()).await.unwrap().unwrap();
        assert_eq!(sale.client_id(), None);
        let repair = services.get_repair(repair.id_typed()).await.unwrap().unwrap();
        assert_eq!(repair.client_id(), None);
        assert_eq!(repair.state(), RepairState::Paid);
    }

    #[tokio::test]
    async fn deleting_a_supplier_keeps_delivered_orders_and_products() {
        let services = services();
        let admin = admin(&services).await;
        let supplier_id = services
            .register_supplier(&admin, "Parts Co", contact(1))
            .await
            .unwrap()
            .id_typed();
        let category_id = category(&services, &admin).await;
        let product_id = services
            .create_product(
                &admin,
                NewProduct {
                    name: "Battery".to_string(),
                    category_id,
                    description: None,
                    initial_selling_price: 2_000,
                    initial_quantity: 0,
                    suppliers: vec![supplier_id],
                },
            )
            .await
            .unwrap()
            .product
            .id_typed();
        let order_id = services
            .create_purchase_order(&admin, Some(supplier_id))
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
                        quantity: 4,
                        purchase_price: Some(1_200),
                    }],
                },
            )
            .await
            .unwrap();
        services.deliver_purchase_order(&admin, order_id).await.unwrap();

        services.delete_supplier(&admin, supplier_id).await.unwrap();

        assert!(services.get_supplier(supplier_id).await.unwrap().is_none());
        let order = services.get_purchase_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.supplier_id(), None);
        assert!(order.delivery_date().is_some());
        let listing = services
            .list_products()
            .await
            .unwrap()
            .into_iter()
            .find(|l| l.product.id_typed() == product_id)
            .unwrap();
        assert!(listing.product.suppliers().is_empty());
        assert_eq!(listing.quantity, 4);
    }

    #[tokio::test]
    async fn repairers_can_delete_clients_once() {
        let services = services();
        let admin = admin(&services).await;
        let repairer = member(&services, &admin, Role::Repairer).await;
        let client = services
            .register_client(&admin, "Ana", "Lopez", contact(1))
            .await
            .unwrap();

        services.delete_client(&repairer, client.id_typed()).await.unwrap();

        let err = services
            .delete_client(&admin, client.id_typed())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::NotFound)));
    }
}
