use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};

use shopdesk_catalog::ProductId;
use shopdesk_core::{Aggregate, DomainError, DomainResult};
use shopdesk_inventory::{StockLedger, StockLevel, StockMovement};

use crate::sale::{CancelSale, Sale, SaleCommand, SaleEvent};

/// What canceling a sale changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleCancellation {
    pub events: Vec<SaleEvent>,
    pub movements: Vec<StockMovement>,
}

/// Cancel a sale: every line is deleted with restitution, then the sale.
///
/// `stocks` must hold the locked level of every product on the sale. Either all
/// lines are restituted and the sale is marked canceled, or nothing changes.
pub fn cancel_sale(
    sale: &mut Sale,
    stocks: &mut BTreeMap<ProductId, StockLevel>,
    occurred_at: DateTime<Utc>,
) -> DomainResult<SaleCancellation> {
    let events = sale.handle(&SaleCommand::CancelSale(CancelSale {
        sale_id: sale.id_typed(),
        occurred_at,
    }))?;

    // Work on copies so a failure half-way leaves every level as it was.
    let mut staged: BTreeMap<ProductId, StockLevel> = BTreeMap::new();
    let mut movements = Vec::new();
    for event in &events {
        let SaleEvent::SaleItemRemoved(removed) = event else {
            continue;
        };
        let level = match staged.entry(removed.product_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let current = stocks.get(&removed.product_id).ok_or_else(|| {
                    DomainError::invariant(format!(
                        "stock level for product {} was not loaded",
                        removed.product_id
                    ))
                })?;
                entry.insert(current.clone())
            }
        };
        if let Some(m) = StockLedger::apply_sale_item_delete(level, removed.quantity, occurred_at)? {
            movements.push(m);
        }
    }

    stocks.extend(staged);
    for event in &events {
        sale.apply(event);
    }

    Ok(SaleCancellation { events, movements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopdesk_catalog::{CategoryId, CreateProduct, Product, ProductCommand};
    use shopdesk_core::AggregateId;

    use crate::edit::SaleEditBatch;
    use crate::sale::{CreateSale, SaleId};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn product() -> Product {
        let id = ProductId::new(AggregateId::new());
        let mut p = Product::empty(id);
        p.execute(&ProductCommand::CreateProduct(CreateProduct {
            product_id: id,
            name: format!("product-{id}"),
            category_id: CategoryId::generate(),
            description: None,
            initial_selling_price: 500,
            suppliers: vec![],
            occurred_at: now(),
        }))
        .unwrap();
        p
    }

    fn sale_with_lines(lines: &[(&Product, i64)], stocks: &mut BTreeMap<ProductId, StockLevel>) -> Sale {
        let id = SaleId::generate();
        let mut sale = Sale::empty(id);
        sale.execute(&SaleCommand::CreateSale(CreateSale {
            sale_id: id,
            client_id: None,
            occurred_at: now(),
        }))
        .unwrap();

        let mut batch = SaleEditBatch::new(id);
        for (p, qty) in lines {
            let stock = stocks.get_mut(&p.id_typed()).unwrap();
            batch
                .add_or_update_item(&mut sale, p, stock, *qty, 500, now())
                .unwrap();
        }
        sale
    }

    #[test]
    fn cancel_restores_every_line() {
        let (a, b) = (product(), product());
        let mut stocks = BTreeMap::from([
            (a.id_typed(), StockLevel::restore(a.id_typed(), 10, 1)),
            (b.id_typed(), StockLevel::restore(b.id_typed(), 4, 1)),
        ]);
        let mut sale = sale_with_lines(&[(&a, 3), (&b, 4)], &mut stocks);
        assert_eq!(stocks[&b.id_typed()].quantity(), 0);

        let result = cancel_sale(&mut sale, &mut stocks, now()).unwrap();

        assert_eq!(result.movements.len(), 2);
        assert_eq!(stocks[&a.id_typed()].quantity(), 10);
        assert_eq!(stocks[&b.id_typed()].quantity(), 4);
        assert!(sale.is_canceled());
    }

    #[test]
    fn cancel_with_missing_stock_level_changes_nothing() {
        let (a, b) = (product(), product());
        let mut stocks = BTreeMap::from([
            (a.id_typed(), StockLevel::restore(a.id_typed(), 10, 1)),
            (b.id_typed(), StockLevel::restore(b.id_typed(), 10, 1)),
        ]);
        let mut sale = sale_with_lines(&[(&a, 3), (&b, 2)], &mut stocks);
        stocks.remove(&b.id_typed());
        let sale_before = sale.clone();

        let err = cancel_sale(&mut sale, &mut stocks, now()).unwrap_err();

        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(sale, sale_before);
        assert_eq!(stocks[&a.id_typed()].quantity(), 7);
    }

    #[test]
    fn cancel_empty_sale_only_marks_it() {
        let mut stocks = BTreeMap::new();
        let mut sale = sale_with_lines(&[], &mut stocks);
        let result = cancel_sale(&mut sale, &mut stocks, now()).unwrap();
        assert_eq!(result.events.len(), 1);
        assert!(result.movements.is_empty());
    }
}
