//! Inventory domain module: the stock ledger.
//!
//! Each product has exactly one [`StockLevel`] holding its on-hand quantity.
//! The quantity moves only through the [`StockLedger`] operations, once per
//! causal event (a sale line created, resized or deleted, a purchase order
//! delivered). Callers are responsible for running each operation against a
//! freshly locked level inside their unit of work.

pub mod ledger;
pub mod stock;

pub use ledger::StockLedger;
pub use stock::{
    DrawForSaleItem, OpenStock, ReceiveDelivery, ResizeSaleItem, RestockFromSaleItem, StockCommand,
    StockEvent, StockLevel, StockMovement, StockOpened, StockReason,
};
