//! Time sources for the scheduler
//!
//! The runtime stamps "now" through a [`Clock`] so timer behaviour can be
//! driven by wall-clock time in production and by a [`VirtualClock`] in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Deadlines further out than this are clamped instead of overflowing `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// Returns the current instant
    fn now(&self) -> Instant;
}

/// Monotonic wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced time for deterministic tests
///
/// Starts at the instant it was created and only moves when
/// [`advance`](Self::advance) or [`set_elapsed`](Self::set_elapsed) is called.
#[derive(Debug)]
pub struct VirtualClock {
    origin: Instant,
    elapsed_nanos: AtomicU64,
}

impl VirtualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock frozen at `origin`
    pub fn starting_at(origin: Instant) -> Self {
        Self {
            origin,
            elapsed_nanos: AtomicU64::new(0),
        }
    }

    /// The instant this clock started at
    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Move time forward by `by`, saturating at `u64::MAX` nanoseconds
    pub fn advance(&self, by: Duration) {
        let nanos = saturating_nanos(by);
        // The closure never returns `None`, so the update cannot fail
        let _ = self
            .elapsed_nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(nanos))
            });
    }

    /// Set the time to `origin + elapsed`, saturating like [`advance`](Self::advance)
    pub fn set_elapsed(&self, elapsed: Duration) {
        self.elapsed_nanos
            .store(saturating_nanos(elapsed), Ordering::Release);
    }

    /// Time elapsed since `origin`
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::Acquire))
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        deadline_after(self.origin, self.elapsed())
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// `base + delay`, clamped so absurd delays never panic
pub(crate) fn deadline_after(base: Instant, delay: Duration) -> Instant {
    base.checked_add(delay)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}
