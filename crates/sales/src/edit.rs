//! One submitted edit of a sale's lines.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use shopdesk_catalog::{Product, ProductId};
use shopdesk_core::{Aggregate, DomainError, DomainResult};
use shopdesk_inventory::{StockLedger, StockLevel, StockMovement};

use crate::sale::{AddItem, RemoveItem, Sale, SaleCommand, SaleEvent, SaleId, SaleItem, SaleItemId, UpdateItem};

/// Result of one line change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOutcome {
    /// The line as it stands after the change; `None` once removed.
    pub item: Option<SaleItem>,
    pub events: Vec<SaleEvent>,
    pub movement: Option<StockMovement>,
}

/// Tracks the products touched while applying one submission to one sale.
///
/// Create a fresh batch per submission: it is how a product listed twice in the
/// same submission is detected, and it must never outlive that submission.
#[derive(Debug)]
pub struct SaleEditBatch {
    sale_id: SaleId,
    seen: HashSet<ProductId>,
}

impl SaleEditBatch {
    pub fn new(sale_id: SaleId) -> Self {
        Self {
            sale_id,
            seen: HashSet::new(),
        }
    }

    pub fn sale_id(&self) -> SaleId {
        self.sale_id
    }

    /// Products touched so far in this submission.
    pub fn touched(&self) -> impl Iterator<Item = &ProductId> {
        self.seen.iter()
    }

    /// Create the product's line, or update it if the sale already has one.
    ///
    /// `stock` must be the product's level as just read under lock.
    pub fn add_or_update_item(
        &mut self,
        sale: &mut Sale,
        product: &Product,
        stock: &mut StockLevel,
        quantity: i64,
        sale_price: u64,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<LineOutcome> {
        let product_id = product.id_typed();
        self.check(sale, product_id, stock)?;

        let existing = sale.item_for(product_id).cloned();
        let command = match &existing {
            None => SaleCommand::AddItem(AddItem {
                sale_id: self.sale_id,
                item_id: SaleItemId::generate(),
                product_id,
                product_sellable: product.is_sellable(),
                quantity,
                sale_price,
                occurred_at,
            }),
            Some(_) => SaleCommand::UpdateItem(UpdateItem {
                sale_id: self.sale_id,
                product_id,
                quantity,
                sale_price,
                occurred_at,
            }),
        };
        let events = sale.handle(&command)?;

        // Decided on both sides before anything is applied to the sale.
        let movement = match &existing {
            None => StockLedger::apply_sale_item_create(stock, quantity, occurred_at)?,
            Some(old) => StockLedger::apply_sale_item_update(stock, old.quantity, quantity, occurred_at)?,
        };
        for event in &events {
            sale.apply(event);
        }
        self.seen.insert(product_id);

        Ok(LineOutcome {
            item: sale.item_for(product_id).cloned(),
            events,
            movement,
        })
    }

    /// Delete the product's line and return its units to stock.
    pub fn remove_item(
        &mut self,
        sale: &mut Sale,
        stock: &mut StockLevel,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<LineOutcome> {
        let product_id = stock.product_id();
        self.check(sale, product_id, stock)?;

        let events = sale.handle(&SaleCommand::RemoveItem(RemoveItem {
            sale_id: self.sale_id,
            product_id,
            occurred_at,
        }))?;
        let quantity = events
            .iter()
            .find_map(|e| match e {
                SaleEvent::SaleItemRemoved(r) => Some(r.quantity),
                _ => None,
            })
            .ok_or_else(|| DomainError::invariant("removing a line emitted no event"))?;

        let movement = StockLedger::apply_sale_item_delete(stock, quantity, occurred_at)?;
        for event in &events {
            sale.apply(event);
        }
        self.seen.insert(product_id);

        Ok(LineOutcome {
            item: None,
            events,
            movement,
        })
    }

    fn check(&self, sale: &Sale, product_id: ProductId, stock: &StockLevel) -> DomainResult<()> {
        if sale.id_typed() != self.sale_id {
            return Err(DomainError::invariant("edit batch belongs to another sale"));
        }
        if stock.product_id() != product_id {
            return Err(DomainError::invariant("stock level belongs to another product"));
        }
        if self.seen.contains(&product_id) {
            return Err(DomainError::DuplicateProductInSale(product_id.0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shopdesk_catalog::{
        CategoryId, CreateProduct, MarkProductInRepair, ProductCommand,
    };
    use shopdesk_core::{AggregateId, AggregateRoot};

    use crate::sale::CreateSale;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn product(name: &str) -> Product {
        let id = ProductId::new(AggregateId::new());
        let mut p = Product::empty(id);
        p.execute(&ProductCommand::CreateProduct(CreateProduct {
            product_id: id,
            name: name.to_string(),
            category_id: CategoryId::generate(),
            description: None,
            initial_selling_price: 2_000,
            suppliers: vec![],
            occurred_at: now(),
        }))
        .unwrap();
        p
    }

    fn sale() -> Sale {
        let id = SaleId::generate();
        let mut s = Sale::empty(id);
        s.execute(&SaleCommand::CreateSale(CreateSale {
            sale_id: id,
            client_id: None,
            occurred_at: now(),
        }))
        .unwrap();
        s
    }

    #[test]
    fn add_update_delete_moves_stock_10_6_3_10() {
        let p = product("USB-C charger");
        let mut stock = StockLevel::restore(p.id_typed(), 10, 1);
        let mut s = sale();

        SaleEditBatch::new(s.id_typed())
            .add_or_update_item(&mut s, &p, &mut stock, 4, 2_000, now())
            .unwrap();
        assert_eq!(stock.quantity(), 6);

        let outcome = SaleEditBatch::new(s.id_typed())
            .add_or_update_item(&mut s, &p, &mut stock, 7, 2_000, now())
            .unwrap();
        assert_eq!(stock.quantity(), 3);
        assert_eq!(outcome.item.map(|i| i.quantity), Some(7));

        SaleEditBatch::new(s.id_typed())
            .remove_item(&mut s, &mut stock, now())
            .unwrap();
        assert_eq!(stock.quantity(), 10);
        assert!(s.items().is_empty());
    }

    #[test]
    fn same_product_twice_in_one_submission_is_rejected() {
        let p = product("Mouse");
        let mut stock = StockLevel::restore(p.id_typed(), 10, 1);
        let mut s = sale();
        let mut batch = SaleEditBatch::new(s.id_typed());

        batch
            .add_or_update_item(&mut s, &p, &mut stock, 1, 900, now())
            .unwrap();
        let err = batch
            .add_or_update_item(&mut s, &p, &mut stock, 2, 900, now())
            .unwrap_err();

        assert_eq!(err, DomainError::DuplicateProductInSale(p.id_typed().0));
        assert_eq!(stock.quantity(), 9);
        assert_eq!(s.item_for(p.id_typed()).map(|i| i.quantity), Some(1));
    }

    #[test]
    fn separate_submissions_do_not_share_duplicate_tracking() {
        let p = product("Keyboard");
        let mut stock = StockLevel::restore(p.id_typed(), 10, 1);
        let mut first = sale();
        let mut second = sale();

        SaleEditBatch::new(first.id_typed())
            .add_or_update_item(&mut first, &p, &mut stock, 1, 900, now())
            .unwrap();
        SaleEditBatch::new(second.id_typed())
            .add_or_update_item(&mut second, &p, &mut stock, 1, 900, now())
            .unwrap();

        assert_eq!(stock.quantity(), 8);
    }

    #[test]
    fn insufficient_stock_leaves_sale_and_stock_untouched() {
        let p = product("SSD 1TB");
        let mut stock = StockLevel::restore(p.id_typed(), 2, 1);
        let mut s = sale();
        let sale_before = s.clone();

        let err = SaleEditBatch::new(s.id_typed())
            .add_or_update_item(&mut s, &p, &mut stock, 3, 9_000, now())
            .unwrap_err();

        assert!(matches!(err, DomainError::InsufficientStock { available: 2, requested: 3, .. }));
        assert_eq!(s, sale_before);
        assert_eq!(stock.quantity(), 2);
        assert_eq!(stock.version(), 1);
    }

    #[test]
    fn unlisted_product_cannot_start_a_line_but_existing_line_stays_editable() {
        let mut p = product("Refurbished monitor");
        let mut stock = StockLevel::restore(p.id_typed(), 5, 1);
        let mut s = sale();

        SaleEditBatch::new(s.id_typed())
            .add_or_update_item(&mut s, &p, &mut stock, 2, 15_000, now())
            .unwrap();

        let id = p.id_typed();
        p.execute(&ProductCommand::MarkProductInRepair(MarkProductInRepair {
            product_id: id,
            occurred_at: now(),
        }))
        .unwrap();

        SaleEditBatch::new(s.id_typed())
            .add_or_update_item(&mut s, &p, &mut stock, 1, 15_000, now())
            .unwrap();
        assert_eq!(stock.quantity(), 4);

        let mut other = sale();
        let err = SaleEditBatch::new(other.id_typed())
            .add_or_update_item(&mut other, &p, &mut stock, 1, 15_000, now())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(stock.quantity(), 4);
    }

    #[test]
    fn removing_a_missing_line_is_not_found() {
        let p = product("Cable");
        let mut stock = StockLevel::restore(p.id_typed(), 5, 1);
        let mut s = sale();
        let err = SaleEditBatch::new(s.id_typed())
            .remove_item(&mut s, &mut stock, now())
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
        assert_eq!(stock.quantity(), 5);
    }

    proptest! {
        #[test]
        fn stock_matches_initial_minus_open_lines_across_sales(
            initial in 0i64..30,
            steps in proptest::collection::vec((0usize..3, 0i64..9), 1..40),
        ) {
            let p = product("Replay");
            let mut stock = StockLevel::restore(p.id_typed(), initial, 1);
            let mut sales = vec![sale(), sale(), sale()];

            // quantity 0 stands for "remove the line".
            for (which, qty) in steps {
                let s = &mut sales[which];
                let mut batch = SaleEditBatch::new(s.id_typed());
                let _ = if qty == 0 {
                    batch.remove_item(s, &mut stock, now())
                } else {
                    batch.add_or_update_item(s, &p, &mut stock, qty, 100, now())
                };

                let held: i64 = sales
                    .iter()
                    .filter_map(|s| s.item_for(p.id_typed()))
                    .map(|i| i.quantity)
                    .sum();
                prop_assert_eq!(stock.quantity(), initial - held);
                prop_assert!(stock.quantity() >= 0);
            }
        }
    }
}
