//! Task-aware mailbox with capacity and overflow policies

use crate::clock::deadline_after;
use crate::config::{MailboxConfig, OverflowStrategy, DEFAULT_MAILBOX_POLL};
use crate::error::MailboxError;
use crate::scheduler::{Notify, TaskContext, TaskId};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of a successful [`Mailbox::enqueue`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub enum EnqueueResult {
    /// The message was queued
    Accepted,
    /// The mailbox was full and the incoming message was discarded
    Dropped,
    /// The mailbox was full and nothing was queued; retry later
    Backpressured,
}

/// Per-task message queue
///
/// FIFO except under [`OverflowStrategy::DropOldest`]. Consumers inside a
/// task park in [`dequeue_blocking`](Self::dequeue_blocking); each accepted
/// message releases the earliest parked consumer from the waiter list and
/// notifies the owning runtime, which resumes the consumer on its next tick.
///
/// Cloning yields another handle to the same mailbox.
pub struct Mailbox<M> {
    inner: Arc<MailboxInner<M>>,
}

struct MailboxInner<M> {
    config: MailboxConfig,
    /// Sleep between checks of `dequeue_blocking_timeout`
    poll_interval: Duration,
    /// Runtime wakeup, fired after every accepted message and on close
    notify: Option<Notify>,
    state: Mutex<MailboxState<M>>,
}

struct MailboxState<M> {
    queue: VecDeque<M>,
    /// Never reverts to false
    closed: bool,
    /// Parked consumers, earliest first
    waiters: VecDeque<TaskId>,
    /// Membership index over `waiters`
    waiter_set: FxHashSet<TaskId>,
}

impl<M> MailboxState<M> {
    /// Register a parked consumer once; repeated registration is a no-op
    fn register_waiter(&mut self, task: TaskId) -> bool {
        if !self.waiter_set.insert(task) {
            return false;
        }
        self.waiters.push_back(task);
        true
    }

    /// Release the earliest registered consumer
    fn release_waiter(&mut self) -> Option<TaskId> {
        let task = self.waiters.pop_front()?;
        self.waiter_set.remove(&task);
        Some(task)
    }

    /// Forget a consumer that stopped waiting
    fn remove_waiter(&mut self, task: TaskId) {
        if self.waiter_set.remove(&task) {
            self.waiters.retain(|queued| *queued != task);
        }
    }
}

/// Unregisters a consumer when its `dequeue_blocking` returns or is dropped
struct WaiterGuard<'a, M> {
    mailbox: &'a Mailbox<M>,
    task: TaskId,
}

impl<M> Drop for WaiterGuard<'_, M> {
    fn drop(&mut self) {
        self.mailbox.inner.state.lock().remove_waiter(self.task);
    }
}

impl<M> Mailbox<M> {
    /// Create a standalone mailbox with no runtime notification
    pub fn new(config: MailboxConfig) -> Self {
        Self::build(config, None, DEFAULT_MAILBOX_POLL)
    }

    /// Create a mailbox that calls `notify` whenever a message is accepted or it closes
    pub fn with_notify(config: MailboxConfig, notify: Notify) -> Self {
        Self::build(config, Some(notify), DEFAULT_MAILBOX_POLL)
    }

    pub(crate) fn build(config: MailboxConfig, notify: Option<Notify>, poll_interval: Duration) -> Self {
        let queue = match config.limit() {
            Some(capacity) => VecDeque::with_capacity(capacity),
            None => VecDeque::new(),
        };
        Self {
            inner: Arc::new(MailboxInner {
                config,
                poll_interval,
                notify,
                state: Mutex::new(MailboxState {
                    queue,
                    closed: false,
                    waiters: VecDeque::new(),
                    waiter_set: FxHashSet::default(),
                }),
            }),
        }
    }

    /// Queue a message, applying the overflow strategy when full
    ///
    /// Fails with [`MailboxError::Closed`] after [`close`](Self::close) and with
    /// [`MailboxError::Overflow`] when full under
    /// [`OverflowStrategy::RejectWithError`].
    pub fn enqueue(&self, message: M) -> Result<EnqueueResult, MailboxError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(MailboxError::Closed);
        }

        if let Some(capacity) = self.inner.config.limit() {
            if state.queue.len() >= capacity {
                let strategy = self.inner.config.strategy;
                match strategy {
                    OverflowStrategy::DropNewest => {
                        tracing::trace!(capacity, "mailbox full, dropped incoming message");
                        return Ok(EnqueueResult::Dropped);
                    }
                    OverflowStrategy::Backpressure => {
                        tracing::trace!(capacity, "mailbox full, backpressured");
                        return Ok(EnqueueResult::Backpressured);
                    }
                    OverflowStrategy::RejectWithError => {
                        return Err(MailboxError::Overflow { capacity, strategy });
                    }
                    OverflowStrategy::DropOldest => {
                        // Zero capacity has nothing to evict; the incoming message goes instead
                        if state.queue.pop_front().is_none() {
                            return Ok(EnqueueResult::Dropped);
                        }
                        tracing::trace!(capacity, "mailbox full, dropped oldest message");
                    }
                }
            }
        }

        state.queue.push_back(message);
        let released = state.release_waiter();
        drop(state);

        if let Some(task) = released {
            tracing::trace!(task = %task, "mailbox waiter released");
        }
        self.notify();
        Ok(EnqueueResult::Accepted)
    }

    /// Take the oldest message without suspending
    pub fn dequeue(&self) -> Option<M> {
        self.inner.state.lock().queue.pop_front()
    }

    /// Take the oldest message, parking the task until one arrives
    ///
    /// The task registers itself as a waiter once, then yields to the runtime.
    /// Every resumption re-checks the queue: being resumed does not mean a
    /// message is there. Fails with [`MailboxError::Closed`] once the mailbox
    /// is closed and drained.
    ///
    /// The task leaves the waiter list as soon as the call returns, and also
    /// when the pending call is dropped (e.g. the task is abandoned).
    pub async fn dequeue_blocking(&self, cx: &TaskContext) -> Result<M, MailboxError> {
        let _registration = WaiterGuard {
            mailbox: self,
            task: cx.id(),
        };
        loop {
            {
                let mut state = self.inner.state.lock();
                if let Some(message) = state.queue.pop_front() {
                    return Ok(message);
                }
                if state.closed {
                    return Err(MailboxError::Closed);
                }
                if state.register_waiter(cx.id()) {
                    tracing::trace!(task = %cx.id(), "parked on empty mailbox");
                }
            }
            cx.yield_now().await;
        }
    }

    /// Take the oldest message, blocking the calling thread for up to `timeout`
    ///
    /// Degraded path for callers outside any task: there is no task to park, so
    /// this sleeps in short fixed intervals and re-checks. Also fails with
    /// [`MailboxError::Closed`] when the timeout elapses. Inside a task this
    /// stalls the whole runtime; use [`dequeue_blocking`](Self::dequeue_blocking).
    pub fn dequeue_blocking_timeout(&self, timeout: Duration) -> Result<M, MailboxError> {
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            {
                let mut state = self.inner.state.lock();
                if let Some(message) = state.queue.pop_front() {
                    return Ok(message);
                }
                if state.closed {
                    return Err(MailboxError::Closed);
                }
            }
            if Instant::now() >= deadline {
                return Err(MailboxError::Closed);
            }
            thread::sleep(self.inner.poll_interval);
        }
    }

    /// Close the mailbox permanently and wake every parked consumer
    ///
    /// Queued messages stay available to drain; new enqueues fail.
    pub fn close(&self) {
        let woken = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.waiter_set.clear();
            std::mem::take(&mut state.waiters)
        };
        tracing::debug!(waiters = woken.len(), "mailbox closed");
        self.notify();
    }

    /// Number of queued messages
    pub fn count(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether no message is queued
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().queue.is_empty()
    }

    /// Whether a bounded mailbox is at capacity (always false when unbounded)
    pub fn is_full(&self) -> bool {
        match self.inner.config.limit() {
            Some(capacity) => self.inner.state.lock().queue.len() >= capacity,
            None => false,
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Capacity limit, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.inner.config.limit()
    }

    /// The mailbox configuration
    pub fn config(&self) -> &MailboxConfig {
        &self.inner.config
    }

    /// Parked consumers, earliest first
    pub fn waiters(&self) -> Vec<TaskId> {
        self.inner.state.lock().waiters.iter().copied().collect()
    }

    /// Number of parked consumers
    pub fn waiter_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    fn notify(&self) {
        if let Some(notify) = &self.inner.notify {
            notify();
        }
    }
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Mailbox")
            .field("config", &self.inner.config)
            .field("length", &state.queue.len())
            .field("closed", &state.closed)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}
