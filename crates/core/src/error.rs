//! Domain error model.

use thiserror::Error;

use crate::id::AggregateId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Every variant is recoverable: callers surface it as a
/// validation message and the actor resubmits with corrected input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version, hardware already linked).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested draw exceeds what the product has on hand.
    ///
    /// `available` is the ceiling that applied to this request.
    #[error("insufficient stock for product {product}: {available} available, {requested} requested")]
    InsufficientStock {
        product: AggregateId,
        available: i64,
        requested: i64,
    },

    /// The same product was submitted twice while editing one sale.
    #[error("product {0} appears more than once in this sale")]
    DuplicateProductInSale(AggregateId),

    /// The same product was submitted twice while editing one purchase order.
    #[error("product {0} appears more than once in this purchase order")]
    DuplicateProductInOrder(AggregateId),

    /// Line items of a delivered purchase order are immutable.
    #[error("purchase order has already been delivered; its items can no longer change")]
    OrderAlreadyDelivered,

    /// `deliver` was called on an order that is already delivered.
    #[error("purchase order is already delivered")]
    AlreadyDelivered,

    #[error("repair is already finished")]
    RepairAlreadyFinished,

    #[error("repair is not finished yet")]
    RepairNotFinished,

    #[error("prepayment {prepayment} exceeds repair price {repair_price}")]
    PrepaymentExceedsPrice { prepayment: u64, repair_price: u64 },

    /// The entity is not in a state that can be handed to the document generator.
    #[error("not printable: {0}")]
    NotPrintable(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn not_printable(msg: impl Into<String>) -> Self {
        Self::NotPrintable(msg.into())
    }
}
