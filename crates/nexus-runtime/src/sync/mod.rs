//! Task-aware synchronization primitives
//!
//! Both primitives suspend the calling task by yielding to its runtime and
//! re-checking on the next tick; neither ever blocks the scheduler thread
//! except for the explicit [`Mailbox::dequeue_blocking_timeout`] escape hatch.

mod future_slot;
mod mailbox;

pub use future_slot::FutureSlot;
pub use mailbox::{EnqueueResult, Mailbox};
