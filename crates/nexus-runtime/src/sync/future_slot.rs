//! Single-assignment result slot

use crate::error::FutureError;
use crate::scheduler::{Notify, TaskContext};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type CancelCallback = Box<dyn FnOnce() + Send + 'static>;

enum Outcome<T, E> {
    Resolved(T),
    Failed(Arc<E>),
    Cancelled,
}

struct SlotState<T, E> {
    /// Written at most once
    outcome: Option<Outcome<T, E>>,
    /// Pending `on_cancel` callbacks, registration order
    cancel_callbacks: Vec<CancelCallback>,
}

struct SlotInner<T, E> {
    notify: Option<Notify>,
    state: Mutex<SlotState<T, E>>,
}

/// Write-once result shared between a producer and any number of waiters
///
/// Exactly one of [`resolve`](Self::resolve), [`fail`](Self::fail) or
/// [`cancel`](Self::cancel) takes effect; later calls return `false` and
/// change nothing. Cloning yields another handle to the same slot.
///
/// A failure is stored behind an [`Arc`] so every waiter can observe it
/// without `E: Clone`; the default `anyhow::Error` slot is awaitable.
pub struct FutureSlot<T, E = anyhow::Error> {
    inner: Arc<SlotInner<T, E>>,
}

impl<T, E> FutureSlot<T, E> {
    /// Create an unresolved slot with no runtime notification
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an unresolved slot that calls `notify` when it settles
    pub fn with_notify(notify: Notify) -> Self {
        Self::build(Some(notify))
    }

    pub(crate) fn build(notify: Option<Notify>) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                notify,
                state: Mutex::new(SlotState {
                    outcome: None,
                    cancel_callbacks: Vec::new(),
                }),
            }),
        }
    }

    /// Complete with a value; `false` if already settled
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Outcome::Resolved(value))
    }

    /// Complete with an error; `false` if already settled
    pub fn fail(&self, error: E) -> bool {
        self.settle(Outcome::Failed(Arc::new(error)))
    }

    /// Cancel and run every registered cancel callback; `false` if already settled
    pub fn cancel(&self) -> bool {
        self.settle(Outcome::Cancelled)
    }

    fn settle(&self, outcome: Outcome<T, E>) -> bool {
        let cancelled = matches!(outcome, Outcome::Cancelled);
        let callbacks = {
            let mut state = self.inner.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            std::mem::take(&mut state.cancel_callbacks)
        };

        if cancelled {
            tracing::trace!(callbacks = callbacks.len(), "future cancelled");
            for callback in callbacks {
                callback();
            }
        }
        // Callbacks registered for a cancellation that never came are dropped here

        if let Some(notify) = &self.inner.notify {
            notify();
        }
        true
    }

    /// Register a callback to run when the slot is cancelled
    ///
    /// Runs immediately if the slot is already cancelled, and is discarded if
    /// the slot already resolved or failed.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.outcome.is_none() {
            state.cancel_callbacks.push(Box::new(callback));
            return;
        }
        let cancelled = matches!(state.outcome, Some(Outcome::Cancelled));
        drop(state);

        if cancelled {
            callback();
        }
    }

    /// Whether any outcome has been written
    pub fn is_settled(&self) -> bool {
        self.inner.state.lock().outcome.is_some()
    }

    /// Whether the slot completed with a value
    pub fn is_resolved(&self) -> bool {
        matches!(self.inner.state.lock().outcome, Some(Outcome::Resolved(_)))
    }

    /// Whether the slot was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.state.lock().outcome, Some(Outcome::Cancelled))
    }
}

impl<T: Clone, E> FutureSlot<T, E> {
    /// The outcome, if settled, without suspending
    pub fn try_outcome(&self) -> Option<Result<T, FutureError<Arc<E>>>> {
        let state = self.inner.state.lock();
        state.outcome.as_ref().map(|outcome| match outcome {
            Outcome::Resolved(value) => Ok(value.clone()),
            Outcome::Failed(error) => Err(FutureError::Failed(Arc::clone(error))),
            Outcome::Cancelled => Err(FutureError::Cancelled),
        })
    }

    /// Suspend the task until the slot settles
    ///
    /// Re-checks once per resumption; every waiter observes the same outcome.
    pub async fn wait(&self, cx: &TaskContext) -> Result<T, FutureError<Arc<E>>> {
        loop {
            if let Some(outcome) = self.try_outcome() {
                return outcome;
            }
            cx.yield_now().await;
        }
    }
}

impl<T, E> Default for FutureSlot<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for FutureSlot<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for FutureSlot<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        let outcome = match state.outcome {
            None => "pending",
            Some(Outcome::Resolved(_)) => "resolved",
            Some(Outcome::Failed(_)) => "failed",
            Some(Outcome::Cancelled) => "cancelled",
        };
        f.debug_struct("FutureSlot")
            .field("outcome", &outcome)
            .field("cancel_callbacks", &state.cancel_callbacks.len())
            .finish()
    }
}
