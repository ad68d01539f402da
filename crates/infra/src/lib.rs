//! Infrastructure layer: persistence, configuration and the application services.
//!
//! The services are the only entry point that touches more than one aggregate.
//! Every mutating operation follows the same shape:
//!
//! ```text
//! AccessPolicy::check
//!   ↓
//! Store::begin (one unit of work)
//!   ↓
//! lock + load rows (stock rows in ascending product id order)
//!   ↓
//! pure domain decision (aggregates, edit batches, ledger)
//!   ↓
//! version-checked saves
//!   ↓
//! commit, then publish the domain events on the bus
//! ```
//!
//! Any error before commit drops the unit of work, which rolls everything back.

pub mod config;
pub mod error;
pub mod services;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use error::{ServiceError, ServiceResult};
pub use services::{
    EnvelopeBus, NewProduct, ProductChanges, ProductListing, PurchaseOrderEditRequest,
    PurchaseOrderLineChange, RenderedDocument, SaleEditRequest, SaleLineChange, Services,
    build_services,
};
pub use store::{AccountRecord, InMemoryStore, PgStore, Store, StoreError, StoreResult, UnitOfWork};
