//! Catalog domain module.
//!
//! Products and their categories. A product's on-hand quantity is not part of
//! this crate: it lives in the inventory `StockLevel` for the product and only
//! moves through the stock ledger.

pub mod category;
pub mod product;

pub use category::{Category, CategoryId};
pub use product::{
    CreateProduct, DEFAULT_DESCRIPTION, LinkSupplier, MarkProductForSale, MarkProductInRepair,
    Product, ProductCommand, ProductCreated, ProductDetailsUpdated, ProductEvent, ProductId,
    ProductMarkedForSale, ProductMarkedInRepair, ProductRecord, ProductStatus, SupplierLinked,
    SupplierUnlinked, UnlinkSupplier, UpdateProductDetails, sellable,
};
