//! Wakeup signalling between primitives and the scheduler loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Wake;

/// Callback a primitive invokes to tell its runtime "something is ready"
pub type Notify = Arc<dyn Fn() + Send + Sync + 'static>;

/// The runtime's `wakeup_pending` flag
///
/// Set by mailbox enqueues, future resolutions, shutdown requests and any
/// waker handed to a task; cleared once per tick to decide whether the loop
/// may sleep.
#[derive(Debug, Default)]
pub(crate) struct WakeSignal {
    pending: AtomicBool,
}

impl WakeSignal {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn notify(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Clear the flag, returning whether it was set
    pub(crate) fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// A [`Notify`] callback that sets this flag
    pub(crate) fn notifier(self: &Arc<Self>) -> Notify {
        let signal = Arc::clone(self);
        Arc::new(move || signal.notify())
    }
}

impl Wake for WakeSignal {
    fn wake(self: Arc<Self>) {
        self.notify();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notify();
    }
}
