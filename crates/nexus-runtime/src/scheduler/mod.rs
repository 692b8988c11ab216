//! Cooperative task scheduling
//!
//! Tasks are futures polled by a single [`Runtime`] loop. A task only gives up
//! the thread at a suspension point: [`TaskContext::yield_now`], a mailbox
//! [`dequeue_blocking`](crate::sync::Mailbox::dequeue_blocking) or a future slot
//! [`wait`](crate::sync::FutureSlot::wait).

mod runtime;
mod task;
mod waker;

pub use runtime::{Runtime, RuntimeState, RuntimeStats, TaskFailure};
pub use task::{TaskContext, TaskId, TaskState, YieldNow};
pub use waker::Notify;
