//! Purchasing domain module (purchase orders).
//!
//! A purchase order is pending until it is delivered. Delivery is the single,
//! terminal transition that feeds stock: every line is received through the
//! inventory ledger and the order becomes immutable.

pub mod deliver;
pub mod edit;
pub mod order;

pub use deliver::{Delivery, deliver_order};
pub use edit::{OrderLineOutcome, PurchaseOrderEditBatch};
pub use order::{
    AddOrderItem, AssignSupplier, CreatePurchaseOrder, DeliverOrder, DetachSupplier, DiscardOrder,
    OrderDelivered, OrderDiscarded, OrderItemAdded, OrderItemRemoved, OrderItemUpdated,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent,
    PurchaseOrderId, PurchaseOrderItem, PurchaseOrderItemId, RemoveOrderItem, SupplierAssigned,
    SupplierDetached, UpdateOrderItem,
};
