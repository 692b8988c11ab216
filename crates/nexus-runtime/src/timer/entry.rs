//! Timer entry value type

use crate::clock::deadline_after;
use crate::timer::CancellationToken;
use std::fmt;
use std::time::{Duration, Instant};

/// Callback run when a timer fires
pub type TimerCallback = Box<dyn FnMut() -> anyhow::Result<()> + Send + 'static>;

/// One pending timed callback
///
/// A repeating entry is never mutated after it fires: [`successor`](Self::successor)
/// consumes it and yields the next entry, chained from the previous deadline.
pub struct TimerEntry {
    /// Action to run
    callback: TimerCallback,
    /// Absolute deadline
    fire_at: Instant,
    /// Refire period; `Some` iff the entry repeats
    interval: Option<Duration>,
    /// Shared with the scheduling call site
    token: CancellationToken,
}

impl TimerEntry {
    /// Create an entry that fires once at `fire_at`
    pub fn one_shot(callback: TimerCallback, fire_at: Instant, token: CancellationToken) -> Self {
        Self {
            callback,
            fire_at,
            interval: None,
            token,
        }
    }

    /// Create an entry that first fires at `fire_at`, then every `interval`
    pub fn repeating(
        callback: TimerCallback,
        fire_at: Instant,
        interval: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            callback,
            fire_at,
            interval: Some(interval),
            token,
        }
    }

    /// Absolute deadline
    pub fn fire_at(&self) -> Instant {
        self.fire_at
    }

    /// Whether the entry repeats
    pub fn is_repeating(&self) -> bool {
        self.interval.is_some()
    }

    /// Refire period of a repeating entry
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// The cancellation token shared with the holder
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether the holder cancelled this timer
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the deadline has been reached at `now`
    pub fn is_due(&self, now: Instant) -> bool {
        self.fire_at <= now
    }

    /// Run the callback
    pub fn fire(&mut self) -> anyhow::Result<()> {
        (self.callback)()
    }

    /// Next entry of a repeating timer, `fire_at + interval` with the same token
    ///
    /// Returns `None` for one-shot entries and for entries cancelled meanwhile
    /// (including by their own callback).
    pub fn successor(self) -> Option<TimerEntry> {
        let interval = self.interval?;
        if self.token.is_cancelled() {
            return None;
        }
        Some(Self {
            fire_at: deadline_after(self.fire_at, interval),
            callback: self.callback,
            interval: Some(interval),
            token: self.token,
        })
    }
}

impl fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEntry")
            .field("fire_at", &self.fire_at)
            .field("interval", &self.interval)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
