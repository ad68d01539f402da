//! Printing: gathers what a document needs and hands it to the generator.

use tracing::{debug, instrument};

use shopdesk_auth::{Action, Actor};
use shopdesk_catalog::ProductId;
use shopdesk_core::DomainError;
use shopdesk_documents::{DocumentData, ProductNames, purchase_order_document, repair_receipt, sale_invoice};
use shopdesk_purchasing::PurchaseOrderId;
use shopdesk_repairs::RepairId;
use shopdesk_sales::SaleId;

use super::Services;
use crate::error::ServiceResult;
use crate::store::UnitOfWork;

/// Bytes produced by the document generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

async fn product_names(
    uow: &mut Box<dyn UnitOfWork>,
    product_ids: impl IntoIterator<Item = ProductId>,
) -> ServiceResult<ProductNames> {
    let mut names = ProductNames::new();
    for product_id in product_ids {
        if let Some(product) = uow.load_product(product_id).await? {
            names.insert(product_id, product.name().to_string());
        }
    }
    Ok(names)
}

impl Services {
    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn print_sale_invoice(&self, actor: &Actor, sale_id: SaleId) -> ServiceResult<RenderedDocument> {
        self.authorize(actor, Action::PrintDocuments)?;

        let mut uow = self.store.begin().await?;
        let sale = uow.load_sale(sale_id).await?.ok_or_else(DomainError::not_found)?;
        let client = match sale.client_id() {
            Some(client_id) => uow.load_client(client_id).await?,
            None => None,
        };
        let names = product_names(&mut uow, sale.items().iter().map(|i| i.product_id)).await?;
        drop(uow);

        self.render(sale_invoice(&sale, client.as_ref(), &names)?)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn print_purchase_order(
        &self,
        actor: &Actor,
        order_id: PurchaseOrderId,
    ) -> ServiceResult<RenderedDocument> {
        self.authorize(actor, Action::PrintDocuments)?;

        let mut uow = self.store.begin().await?;
        let order = uow
            .load_purchase_order(order_id)
            .await?
            .ok_or_else(DomainError::not_found)?;
        let supplier = match order.supplier_id() {
            Some(supplier_id) => uow.load_supplier(supplier_id).await?,
            None => None,
        };
        let names = product_names(&mut uow, order.items().iter().map(|i| i.product_id)).await?;
        drop(uow);

        self.render(purchase_order_document(&order, supplier.as_ref(), &names)?)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.account_id), err)]
    pub async fn print_repair_receipt(&self, actor: &Actor, repair_id: RepairId) -> ServiceResult<RenderedDocument> {
        self.authorize(actor, Action::PrintDocuments)?;

        let mut uow = self.store.begin().await?;
        let repair = uow.load_repair(repair_id).await?.ok_or_else(DomainError::not_found)?;
        let hardware_id = repair
            .hardware_id()
            .ok_or_else(|| DomainError::invariant("repair has no hardware"))?;
        let hardware = uow.load_hardware(hardware_id).await?.ok_or_else(DomainError::not_found)?;
        let client = match repair.client_id() {
            Some(client_id) => uow.load_client(client_id).await?,
            None => None,
        };
        drop(uow);

        self.render(repair_receipt(&repair, &hardware, client.as_ref())?)
    }

    fn render(&self, data: DocumentData) -> ServiceResult<RenderedDocument> {
        let bytes = self.documents.render(&data)?;
        debug!(kind = ?data.kind, bytes = bytes.len(), "document rendered");
        Ok(RenderedDocument {
            content_type: self.documents.content_type(),
            bytes,
        })
    }
}
