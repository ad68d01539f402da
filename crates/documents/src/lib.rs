//! `shopdesk-documents`: printable documents (invoices, order forms, repair receipts).
//!
//! Layout and rendering live outside the core. This crate decides whether a
//! source entity is printable, flattens it into [`DocumentData`], and hands that
//! to a [`DocumentGenerator`].

pub mod data;
pub mod generator;

pub use data::{
    DocumentData, DocumentKind, DocumentLine, DocumentParty, ProductNames, purchase_order_document,
    repair_receipt, sale_invoice,
};
pub use generator::{DocumentError, DocumentGenerator, JsonDocumentGenerator};
