//! Shared cancellation flag

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared "has this been cancelled" flag
///
/// Cloning yields another handle to the same flag: the scheduling call site
/// keeps one clone, the queued timer entry holds another.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the token cancelled. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether `cancel` has been called on any handle
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether two handles share the same flag
    pub fn same_token(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}
