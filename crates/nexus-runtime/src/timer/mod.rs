//! Timer subsystem
//!
//! Delayed and repeating callbacks ordered by deadline. The queue is advanced
//! once per scheduler tick; cancellation goes through a shared
//! [`CancellationToken`] and cancelled entries are purged lazily.

mod entry;
mod queue;
mod token;

pub use entry::{TimerCallback, TimerEntry};
pub use queue::TimerQueue;
pub use token::CancellationToken;
