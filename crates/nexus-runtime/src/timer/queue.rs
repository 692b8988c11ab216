//! Deadline-ordered timer queue

use crate::clock::deadline_after;
use crate::timer::{CancellationToken, TimerEntry};
use std::time::{Duration, Instant};

/// Pending timers, ascending by deadline, insertion order on ties
///
/// Insertion scans from the back and splices, which keeps ties stable and is
/// cheap for the small-to-moderate timer counts an actor system carries.
/// Cancelled entries stay in place until the next [`advance`](Self::advance).
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: Vec<TimerEntry>,
}

impl TimerQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` to run once, `delay` after `now`
    pub fn schedule_once<F>(&mut self, delay: Duration, callback: F, now: Instant) -> CancellationToken
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let token = CancellationToken::new();
        self.insert(TimerEntry::one_shot(
            Box::new(callback),
            deadline_after(now, delay),
            token.clone(),
        ));
        token
    }

    /// Schedule `callback` to run `initial_delay` after `now`, then every `interval`
    pub fn schedule_repeatedly<F>(
        &mut self,
        initial_delay: Duration,
        interval: Duration,
        callback: F,
        now: Instant,
    ) -> CancellationToken
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let token = CancellationToken::new();
        self.insert(TimerEntry::repeating(
            Box::new(callback),
            deadline_after(now, initial_delay),
            interval,
            token.clone(),
        ));
        token
    }

    /// Insert an entry after every entry with an equal or earlier deadline
    pub fn insert(&mut self, entry: TimerEntry) {
        let position = self
            .entries
            .iter()
            .rposition(|queued| queued.fire_at() <= entry.fire_at())
            .map_or(0, |index| index + 1);
        self.entries.insert(position, entry);
    }

    /// Fire every due entry once and drop cancelled ones
    ///
    /// Due entries run in deadline order. A repeating entry that was not
    /// cancelled (by its holder or its own callback) is re-queued at
    /// `fire_at + interval`. Returns how many callbacks ran.
    ///
    /// A callback error stops the sweep: the failing entry is consumed, every
    /// entry not yet visited stays queued, and the error is returned.
    pub fn advance(&mut self, now: Instant) -> anyhow::Result<usize> {
        let (fired, result) = self.sweep(now);
        result.map(|()| fired)
    }

    /// Same as [`advance`](Self::advance), but reports how many callbacks ran
    /// even when one of them failed. The failing callback is counted.
    pub fn sweep(&mut self, now: Instant) -> (usize, anyhow::Result<()>) {
        let mut pending = std::mem::take(&mut self.entries).into_iter();
        let mut retained = Vec::with_capacity(pending.len());
        let mut chained = Vec::new();
        let mut fired = 0;

        while let Some(mut entry) = pending.next() {
            if entry.is_cancelled() {
                continue;
            }
            if !entry.is_due(now) {
                retained.push(entry);
                continue;
            }

            fired += 1;
            tracing::trace!(repeating = entry.is_repeating(), "timer fired");
            if let Err(err) = entry.fire() {
                retained.extend(pending);
                retained.append(&mut chained);
                self.restore(retained);
                return (fired, Err(err));
            }
            if let Some(next) = entry.successor() {
                chained.push(next);
            }
        }

        // Successors count as newly inserted: they go after existing ties
        retained.append(&mut chained);
        self.restore(retained);
        (fired, Ok(()))
    }

    /// Whether any queued entry is still live
    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(|entry| !entry.is_cancelled())
    }

    /// Earliest deadline among live entries
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .find(|entry| !entry.is_cancelled())
            .map(TimerEntry::fire_at)
    }

    /// Queued entries, including cancelled ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Move every entry of `newer` into this queue, after existing ties
    pub fn merge(&mut self, newer: TimerQueue) {
        for entry in newer.entries {
            self.insert(entry);
        }
    }

    fn restore(&mut self, mut entries: Vec<TimerEntry>) {
        // Stable: equal deadlines keep their relative order
        entries.sort_by_key(TimerEntry::fire_at);
        self.entries = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnMut() -> anyhow::Result<()> + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &'static str| {
            let sink = sink.clone();
            Box::new(move || {
                sink.lock().push(label);
                Ok(())
            }) as Box<dyn FnMut() -> anyhow::Result<()> + Send>
        };
        (log, make)
    }

    #[test]
    fn test_timer_queue_creation() {
        let queue = TimerQueue::new();
        assert!(queue.is_empty());
        assert!(!queue.has_pending());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let t0 = Instant::now();
        let (log, make) = recorder();
        let mut queue = TimerQueue::new();

        queue.schedule_once(secs(3), make("3s"), t0);
        queue.schedule_once(secs(1), make("1s"), t0);
        queue.schedule_once(secs(2), make("2s"), t0);
        assert_eq!(queue.next_deadline(), Some(t0 + secs(1)));

        let fired = queue.advance(t0 + secs(5)).unwrap();
        assert_eq!(fired, 3);
        assert_eq!(*log.lock(), vec!["1s", "2s", "3s"]);
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_equal_deadlines_fire_in_insertion_order() {
        let t0 = Instant::now();
        let (log, make) = recorder();
        let mut queue = TimerQueue::new();

        queue.schedule_once(secs(1), make("first"), t0);
        queue.schedule_once(secs(2), make("late"), t0);
        queue.schedule_once(secs(1), make("second"), t0);
        queue.schedule_once(secs(1), make("third"), t0);

        queue.advance(t0 + secs(2)).unwrap();
        assert_eq!(*log.lock(), vec!["first", "second", "third", "late"]);
    }

    #[test]
    fn test_entries_not_due_are_retained() {
        let t0 = Instant::now();
        let (log, make) = recorder();
        let mut queue = TimerQueue::new();

        queue.schedule_once(secs(1), make("early"), t0);
        queue.schedule_once(secs(10), make("later"), t0);

        assert_eq!(queue.advance(t0 + secs(1)).unwrap(), 1);
        assert_eq!(queue.len(), 1);
        assert!(queue.has_pending());
        assert_eq!(queue.next_deadline(), Some(t0 + secs(10)));
        assert_eq!(*log.lock(), vec!["early"]);
    }

    #[test]
    fn test_repeating_timer_chains_from_schedule() {
        let t0 = Instant::now();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut queue = TimerQueue::new();

        queue.schedule_repeatedly(
            secs(2),
            secs(3),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            t0,
        );

        let checkpoints = [(1, 0), (2, 1), (4, 1), (5, 2), (8, 3)];
        for (at, expected) in checkpoints {
            queue.advance(t0 + secs(at)).unwrap();
            assert_eq!(count.load(Ordering::SeqCst), expected, "at t0+{}s", at);
        }
        assert_eq!(queue.next_deadline(), Some(t0 + secs(11)));
    }

    #[test]
    fn test_repeating_timer_fires_once_per_advance() {
        let t0 = Instant::now();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut queue = TimerQueue::new();

        queue.schedule_repeatedly(
            secs(1),
            secs(1),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            t0,
        );

        // Several intervals overdue still fire once; the successor stays behind
        queue.advance(t0 + secs(10)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(queue.next_deadline(), Some(t0 + secs(2)));
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let t0 = Instant::now();
        let (log, make) = recorder();
        let mut queue = TimerQueue::new();

        let token = queue.schedule_once(secs(1), make("cancelled"), t0);
        queue.schedule_once(secs(1), make("kept"), t0);
        token.cancel();

        // Lazily purged: still queued but no longer pending work
        assert_eq!(queue.len(), 2);
        assert!(queue.has_pending());

        queue.advance(t0 + secs(1)).unwrap();
        assert_eq!(*log.lock(), vec!["kept"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_only_cancelled_entries_are_not_pending() {
        let t0 = Instant::now();
        let mut queue = TimerQueue::new();
        let token = queue.schedule_once(secs(1), || Ok(()), t0);
        token.cancel();

        assert_eq!(queue.len(), 1);
        assert!(!queue.has_pending());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn test_repeating_timer_cancelled_by_own_callback() {
        let t0 = Instant::now();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let slot: Arc<Mutex<Option<CancellationToken>>> = Arc::new(Mutex::new(None));
        let own = slot.clone();
        let mut queue = TimerQueue::new();

        let token = queue.schedule_repeatedly(
            secs(1),
            secs(1),
            move || {
                if c.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                    if let Some(token) = own.lock().as_ref() {
                        token.cancel();
                    }
                }
                Ok(())
            },
            t0,
        );
        *slot.lock() = Some(token.clone());

        for at in 1..=5 {
            queue.advance(t0 + secs(at)).unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(token.is_cancelled());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_callback_error_keeps_unvisited_entries() {
        let t0 = Instant::now();
        let (log, make) = recorder();
        let mut queue = TimerQueue::new();

        queue.schedule_once(secs(1), make("before"), t0);
        queue.schedule_once(secs(2), || Err(anyhow::anyhow!("boom")), t0);
        queue.schedule_once(secs(3), make("after"), t0);

        let err = queue.advance(t0 + secs(5)).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(*log.lock(), vec!["before"]);
        assert_eq!(queue.len(), 1);

        queue.advance(t0 + secs(5)).unwrap();
        assert_eq!(*log.lock(), vec!["before", "after"]);
    }

    #[test]
    fn test_sweep_counts_callbacks_before_error() {
        let t0 = Instant::now();
        let (log, make) = recorder();
        let mut queue = TimerQueue::new();

        queue.schedule_once(secs(1), make("a"), t0);
        queue.schedule_once(secs(1), make("b"), t0);
        queue.schedule_once(secs(2), || Err(anyhow::anyhow!("boom")), t0);
        queue.schedule_once(secs(3), make("c"), t0);

        let (fired, result) = queue.sweep(t0 + secs(5));
        assert_eq!(fired, 3);
        assert_eq!(result.unwrap_err().to_string(), "boom");
        assert_eq!(*log.lock(), vec!["a", "b"]);

        let (fired, result) = queue.sweep(t0 + secs(5));
        assert_eq!(fired, 1);
        assert!(result.is_ok());
    }

    #[test]
    fn test_successor_sorts_after_existing_tie() {
        let t0 = Instant::now();
        let (log, make) = recorder();
        let mut queue = TimerQueue::new();

        let ticker = queue.schedule_repeatedly(secs(1), secs(2), make("tick"), t0);
        queue.schedule_once(secs(3), make("once"), t0);

        queue.advance(t0 + secs(1)).unwrap();
        queue.advance(t0 + secs(3)).unwrap();
        ticker.cancel();
        assert_eq!(*log.lock(), vec!["tick", "once", "tick"]);
    }

    #[test]
    fn test_merge_keeps_newer_entries_after_ties() {
        let t0 = Instant::now();
        let (log, make) = recorder();
        let mut older = TimerQueue::new();
        let mut newer = TimerQueue::new();

        older.schedule_once(secs(1), make("older"), t0);
        newer.schedule_once(secs(1), make("newer"), t0);
        newer.schedule_once(secs(0), make("sooner"), t0);
        older.merge(newer);

        older.advance(t0 + secs(1)).unwrap();
        assert_eq!(*log.lock(), vec!["sooner", "older", "newer"]);
    }
}
