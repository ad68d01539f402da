//! Sales domain module.
//!
//! A [`Sale`] owns its lines, at most one per product. Every line change moves
//! the product's stock through the inventory ledger in the same decision, so the
//! editing entry points live next to the aggregate: [`SaleEditBatch`] for one
//! submitted edit of a sale's lines, and [`cancel_sale`] for cancellation with
//! full restitution.

pub mod cancel;
pub mod edit;
pub mod sale;

pub use cancel::{SaleCancellation, cancel_sale};
pub use edit::{LineOutcome, SaleEditBatch};
pub use sale::{
    AddItem, AssignClient, CancelSale, ClientAssigned, CreateSale, RemoveItem, Sale, SaleCanceled,
    SaleCommand, SaleCreated, SaleEvent, SaleId, SaleItem, SaleItemAdded, SaleItemId,
    SaleItemRemoved, SaleItemUpdated, UpdateItem,
};
