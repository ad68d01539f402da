//! Publishing committed changes to in-process listeners.
//!
//! ## After-commit contract
//!
//! A service collects the events of one operation while its unit of work is
//! open and hands them to the bus only after `commit` returned `Ok`:
//!
//! ```text
//! authorize → begin → load/lock → decide → save → commit → publish
//! ```
//!
//! From this ordering listeners can rely on the following:
//!
//! - An event is never seen for a change that was rolled back. A denied,
//!   invalid or conflicting operation publishes nothing.
//! - Events of one operation arrive together and in the order the aggregates
//!   produced them (for a sale edit: the sale events, then the stock movements).
//! - Two operations that lock the same row publish in commit order. Unrelated
//!   operations may interleave.
//!
//! The bus does not persist. If publishing fails after a commit, the stored
//! state stays as committed and the failure is only logged, so a listener may
//! miss events and must re-read the store when it needs the current state.
//! A listener that subscribes late sees only what is published afterwards.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};

/// Receiving end handed out by [`EventBus::subscribe`].
///
/// Every subscription gets its own copy of each published message. Messages
/// queue until read; dropping the subscription unregisters it on the next
/// publish.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Next queued message, if any. Never blocks.
    pub fn try_next(&self) -> Option<M> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Fan-out of committed events.
///
/// `publish` is called once per event, after commit, from the task that ran
/// the operation. An `Err` reports that delivery failed; it never means the
/// change was undone.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
