//! Entity trait: identity + continuity across state changes.
//!
//! Line items and hardware units are entities owned by an aggregate: they have an
//! identity of their own but are only ever changed through their owner.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
