//! Domain events and their distribution.
//!
//! Aggregates emit typed events (see [`Event`]); after a unit of work commits,
//! the infrastructure wraps them in an [`EventEnvelope`] and fans them out on an
//! [`EventBus`]. Events are notifications only: the relational state is the
//! source of truth.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::{EnvelopeError, EventEnvelope};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
