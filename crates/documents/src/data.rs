use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopdesk_catalog::ProductId;
use shopdesk_core::{DomainError, DomainResult};
use shopdesk_parties::{Client, ContactInfo, Supplier};
use shopdesk_purchasing::PurchaseOrder;
use shopdesk_repairs::{HardwareToRepair, Repair, RepairState};
use shopdesk_sales::Sale;

/// Display names used to label document lines.
pub type ProductNames = HashMap<ProductId, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    SaleInvoice,
    PurchaseOrder,
    RepairReceipt,
}

/// Counterparty printed in the document header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentParty {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
}

impl DocumentParty {
    fn new(name: String, contact: &ContactInfo) -> Self {
        Self {
            name,
            phone: contact.phone.clone(),
            email: contact.email.clone(),
            address: contact.address.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub description: String,
    pub quantity: i64,
    /// `None` when the price is not known yet (purchase orders).
    pub unit_price: Option<u64>,
    pub line_total: u64,
}

/// Everything a renderer needs; amounts in smallest currency unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentData {
    pub kind: DocumentKind,
    pub reference: Uuid,
    pub issued_on: DateTime<Utc>,
    pub party: Option<DocumentParty>,
    pub lines: Vec<DocumentLine>,
    pub total: u64,
    pub prepaid: u64,
    pub balance_due: u64,
}

fn label(names: &ProductNames, product_id: ProductId) -> String {
    names
        .get(&product_id)
        .cloned()
        .unwrap_or_else(|| product_id.to_string())
}

/// Invoice for a sale. Needs at least one line and an assigned client.
pub fn sale_invoice(sale: &Sale, client: Option<&Client>, names: &ProductNames) -> DomainResult<DocumentData> {
    if sale.items().is_empty() {
        return Err(DomainError::not_printable("sale has no items"));
    }
    let client = match (sale.client_id(), client) {
        (Some(expected), Some(c)) if c.id_typed() == expected => c,
        (Some(_), Some(_)) => {
            return Err(DomainError::invariant("client does not belong to this sale"));
        }
        _ => return Err(DomainError::not_printable("sale has no client")),
    };

    let lines = sale
        .items()
        .iter()
        .map(|item| DocumentLine {
            description: label(names, item.product_id),
            quantity: item.quantity,
            unit_price: Some(item.sale_price),
            line_total: item.line_total(),
        })
        .collect();

    let total = sale.total();
    Ok(DocumentData {
        kind: DocumentKind::SaleInvoice,
        reference: *sale.id_typed().as_uuid(),
        issued_on: sale.sale_date(),
        party: Some(DocumentParty::new(client.full_name(), client.contact())),
        lines,
        total,
        prepaid: 0,
        balance_due: total,
    })
}

/// Order form sent to a supplier. Needs at least one line.
pub fn purchase_order_document(
    order: &PurchaseOrder,
    supplier: Option<&Supplier>,
    names: &ProductNames,
) -> DomainResult<DocumentData> {
    if order.items().is_empty() {
        return Err(DomainError::not_printable("purchase order has no items"));
    }

    let lines = order
        .items()
        .iter()
        .map(|item| DocumentLine {
            description: label(names, item.product_id),
            quantity: item.quantity,
            unit_price: item.purchase_price,
            line_total: item.line_total(),
        })
        .collect();

    let total = order.total();
    Ok(DocumentData {
        kind: DocumentKind::PurchaseOrder,
        reference: *order.id_typed().as_uuid(),
        issued_on: order.order_date(),
        party: supplier.map(|s| DocumentParty::new(s.name().to_string(), s.contact())),
        lines,
        total,
        prepaid: 0,
        balance_due: total,
    })
}

/// Receipt handed over with a repaired device. Needs a Finished or Paid repair.
pub fn repair_receipt(
    repair: &Repair,
    hardware: &HardwareToRepair,
    client: Option<&Client>,
) -> DomainResult<DocumentData> {
    if repair.state() == RepairState::InProgress {
        return Err(DomainError::not_printable("repair is still in progress"));
    }
    if repair.hardware_id() != Some(hardware.id_typed()) {
        return Err(DomainError::invariant("hardware does not belong to this repair"));
    }

    Ok(DocumentData {
        kind: DocumentKind::RepairReceipt,
        reference: *repair.id_typed().as_uuid(),
        issued_on: repair.delivery_date().unwrap_or_else(|| repair.deposit_date()),
        party: client.map(|c| DocumentParty::new(c.full_name(), c.contact())),
        lines: vec![DocumentLine {
            description: format!("{}: {}", repair.title(), hardware.name()),
            quantity: 1,
            unit_price: Some(repair.repair_price()),
            line_total: repair.repair_price(),
        }],
        total: repair.repair_price(),
        prepaid: repair.prepayment(),
        balance_due: repair.balance_due(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdesk_catalog::CategoryId;
    use shopdesk_core::AggregateId;
    use shopdesk_parties::ClientId;
    use shopdesk_purchasing::{PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId};
    use shopdesk_repairs::{HardwareId, RepairId, RepairRecord};
    use shopdesk_sales::{SaleId, SaleItem, SaleItemId};

    fn test_time() -> DateTime<Utc> {
        DateTime::<Utc>::default()
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_client() -> Client {
        Client::restore(
            ClientId::new(AggregateId::new()),
            "Ana".to_string(),
            "Lopez".to_string(),
            ContactInfo::new("555-0100", "ana@example.com", "1 Main St").unwrap(),
            1,
        )
    }

    fn sale_with(client: Option<ClientId>, product_id: ProductId, quantity: i64) -> Sale {
        let items = if quantity > 0 {
            vec![SaleItem {
                id: SaleItemId::new(AggregateId::new()),
                product_id,
                quantity,
                sale_price: 250,
            }]
        } else {
            Vec::new()
        };
        Sale::restore(SaleId::new(AggregateId::new()), client, test_time(), items, 1)
    }

    fn test_repair(state: RepairState, hardware_id: HardwareId) -> Repair {
        Repair::from_record(RepairRecord {
            id: RepairId::new(AggregateId::new()),
            title: "Screen".to_string(),
            description: String::new(),
            hardware_id,
            client_id: None,
            prepayment: 40,
            repair_price: 100,
            state,
            deposit_date: test_time(),
            delivery_date: None,
            version: 1,
        })
    }

    #[test]
    fn sale_invoice_lists_lines_with_names_and_total() {
        let client = test_client();
        let product_id = test_product_id();
        let sale = sale_with(Some(client.id_typed()), product_id, 3);
        let names = ProductNames::from([(product_id, "Charger".to_string())]);

        let doc = sale_invoice(&sale, Some(&client), &names).unwrap();

        assert_eq!(doc.kind, DocumentKind::SaleInvoice);
        assert_eq!(doc.lines.len(), 1);
        assert_eq!(doc.lines[0].description, "Charger");
        assert_eq!(doc.total, 750);
        assert_eq!(doc.party.unwrap().name, "Ana Lopez");
    }

    #[test]
    fn sale_without_items_is_not_printable() {
        let client = test_client();
        let sale = sale_with(Some(client.id_typed()), test_product_id(), 0);

        let err = sale_invoice(&sale, Some(&client), &ProductNames::new()).unwrap_err();
        assert!(matches!(err, DomainError::NotPrintable(_)));
    }

    #[test]
    fn sale_without_client_is_not_printable() {
        let sale = sale_with(None, test_product_id(), 1);

        let err = sale_invoice(&sale, None, &ProductNames::new()).unwrap_err();
        assert!(matches!(err, DomainError::NotPrintable(_)));
    }

    #[test]
    fn purchase_order_needs_items_but_not_prices() {
        let product_id = test_product_id();
        let empty = PurchaseOrder::restore(
            PurchaseOrderId::new(AggregateId::new()),
            None,
            test_time(),
            None,
            Vec::new(),
            1,
        );
        assert!(matches!(
            purchase_order_document(&empty, None, &ProductNames::new()),
            Err(DomainError::NotPrintable(_))
        ));

        let order = PurchaseOrder::restore(
            PurchaseOrderId::new(AggregateId::new()),
            None,
            test_time(),
            None,
            vec![PurchaseOrderItem {
                id: PurchaseOrderItemId::new(AggregateId::new()),
                product_id,
                quantity: 5,
                purchase_price: None,
            }],
            1,
        );
        let doc = purchase_order_document(&order, None, &ProductNames::new()).unwrap();
        assert_eq!(doc.lines[0].unit_price, None);
        assert_eq!(doc.lines[0].description, product_id.to_string());
        assert_eq!(doc.total, 0);
    }

    #[test]
    fn repair_in_progress_is_not_printable() {
        let hardware = HardwareToRepair::new(
            HardwareId::new(AggregateId::new()),
            "Laptop",
            CategoryId::new(AggregateId::new()),
            "",
        )
        .unwrap();
        let repair = test_repair(RepairState::InProgress, hardware.id_typed());

        let err = repair_receipt(&repair, &hardware, None).unwrap_err();
        assert!(matches!(err, DomainError::NotPrintable(_)));
    }

    #[test]
    fn finished_repair_receipt_shows_balance_due() {
        let hardware = HardwareToRepair::new(
            HardwareId::new(AggregateId::new()),
            "Laptop",
            CategoryId::new(AggregateId::new()),
            "",
        )
        .unwrap();
        let repair = test_repair(RepairState::Finished, hardware.id_typed());

        let doc = repair_receipt(&repair, &hardware, None).unwrap();
        assert_eq!(doc.kind, DocumentKind::RepairReceipt);
        assert_eq!(doc.total, 100);
        assert_eq!(doc.prepaid, 40);
        assert_eq!(doc.balance_due, 60);
        assert_eq!(doc.lines[0].description, "Screen: Laptop");
    }
}
