use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use chrono::{DateTime, Utc};

use shopdesk_catalog::ProductId;
use shopdesk_core::{Aggregate, DomainError, DomainResult};
use shopdesk_inventory::{StockLedger, StockLevel, StockMovement};

use crate::order::{DeliverOrder, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent};

/// What delivering an order changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub events: Vec<PurchaseOrderEvent>,
    pub movements: Vec<StockMovement>,
}

/// Deliver a pending order: each line is received into stock, then the order is
/// stamped with `occurred_at` as its delivery date.
///
/// `stocks` must hold the locked level of every product on the order. Either
/// every line is received and the order is delivered, or nothing changes.
pub fn deliver_order(
    order: &mut PurchaseOrder,
    stocks: &mut BTreeMap<ProductId, StockLevel>,
    occurred_at: DateTime<Utc>,
) -> DomainResult<Delivery> {
    let events = order.handle(&PurchaseOrderCommand::DeliverOrder(DeliverOrder {
        order_id: order.id_typed(),
        occurred_at,
    }))?;

    let mut staged: BTreeMap<ProductId, StockLevel> = BTreeMap::new();
    let mut movements = Vec::new();
    for event in &events {
        let PurchaseOrderEvent::OrderDelivered(delivered) = event else {
            continue;
        };
        for line in &delivered.lines {
            let level = match staged.entry(line.product_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let current = stocks.get(&line.product_id).ok_or_else(|| {
                        DomainError::invariant(format!(
                            "stock level for product {} was not loaded",
                            line.product_id
                        ))
                    })?;
                    entry.insert(current.clone())
                }
            };
            if let Some(m) =
                StockLedger::apply_purchase_order_item_delivered(level, line.quantity, occurred_at)?
            {
                movements.push(m);
            }
        }
    }

    stocks.extend(staged);
    for event in &events {
        order.apply(event);
    }

    Ok(Delivery { events, movements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::PurchaseOrderEditBatch;
    use crate::order::{CreatePurchaseOrder, PurchaseOrderId};
    use proptest::prelude::*;
    use shopdesk_core::AggregateId;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn order_with(lines: &[(ProductId, i64)]) -> PurchaseOrder {
        let id = PurchaseOrderId::generate();
        let mut o = PurchaseOrder::empty(id);
        o.execute(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
            order_id: id,
            supplier_id: None,
            occurred_at: now(),
        }))
        .unwrap();
        let mut batch = PurchaseOrderEditBatch::new(id);
        for (p, q) in lines {
            batch.add_or_update_item(&mut o, *p, *q, Some(300), now()).unwrap();
        }
        o
    }

    #[test]
    fn delivery_adds_each_line_once() {
        let p = ProductId::new(AggregateId::new());
        let mut stocks = BTreeMap::from([(p, StockLevel::restore(p, 2, 1))]);
        let mut o = order_with(&[(p, 5)]);
        let at = now();

        let delivery = deliver_order(&mut o, &mut stocks, at).unwrap();

        assert_eq!(delivery.movements.len(), 1);
        assert_eq!(stocks[&p].quantity(), 7);
        assert_eq!(o.delivery_date(), Some(at));

        let err = deliver_order(&mut o, &mut stocks, now()).unwrap_err();
        assert_eq!(err, DomainError::AlreadyDelivered);
        assert_eq!(stocks[&p].quantity(), 7);
    }

    #[test]
    fn missing_stock_level_aborts_the_whole_delivery() {
        let (a, b) = (ProductId::new(AggregateId::new()), ProductId::new(AggregateId::new()));
        let mut stocks = BTreeMap::from([(a, StockLevel::restore(a, 0, 1))]);
        let mut o = order_with(&[(a, 3), (b, 4)]);

        let err = deliver_order(&mut o, &mut stocks, now()).unwrap_err();

        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(stocks[&a].quantity(), 0);
        assert!(!o.is_delivered());
    }

    #[test]
    fn empty_order_cannot_be_delivered() {
        let mut stocks = BTreeMap::new();
        let mut o = order_with(&[]);
        let err = deliver_order(&mut o, &mut stocks, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(!o.is_delivered());
    }

    proptest! {
        #[test]
        fn delivery_credits_each_line_once(
            lines in proptest::collection::vec((0i64..50, 1i64..20), 1..6),
        ) {
            let products: Vec<ProductId> = lines.iter().map(|_| ProductId::new(AggregateId::new())).collect();
            let mut stocks: BTreeMap<ProductId, StockLevel> = products
                .iter()
                .zip(&lines)
                .map(|(p, (on_hand, _))| (*p, StockLevel::restore(*p, *on_hand, 1)))
                .collect();
            let order_lines: Vec<(ProductId, i64)> =
                products.iter().zip(&lines).map(|(p, (_, qty))| (*p, *qty)).collect();
            let mut o = order_with(&order_lines);

            let delivery = deliver_order(&mut o, &mut stocks, now()).unwrap();

            prop_assert_eq!(delivery.movements.len(), lines.len());
            let credited: i64 = delivery.movements.iter().map(|m| m.delta).sum();
            prop_assert_eq!(credited, lines.iter().map(|(_, qty)| qty).sum::<i64>());
            for (p, (on_hand, qty)) in products.iter().zip(&lines) {
                prop_assert_eq!(stocks[p].quantity(), on_hand + qty);
            }

            let after_first = stocks.clone();
            let err = deliver_order(&mut o, &mut stocks, now()).unwrap_err();
            prop_assert_eq!(err, DomainError::AlreadyDelivered);
            prop_assert_eq!(stocks, after_first);
        }
    }
}
