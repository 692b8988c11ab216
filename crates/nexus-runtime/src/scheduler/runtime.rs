//! Cooperative single-threaded runtime
//!
//! The runtime owns a task registry and a [`TimerQueue`]. Each call to
//! [`Runtime::tick`] polls every registered task once, in spawn order, and
//! then fires due timers. [`Runtime::run`] repeats ticks until shutdown
//! completes or nothing is left to do.

use crate::clock::{deadline_after, Clock, SystemClock};
use crate::config::{MailboxConfig, RuntimeConfig};
use crate::error::RuntimeError;
use crate::scheduler::task::{BoxedTask, Task, TaskWork};
use crate::scheduler::waker::WakeSignal;
use crate::scheduler::{TaskContext, TaskId, TaskState, YieldNow};
use crate::sync::{FutureSlot, Mailbox};
use crate::timer::{CancellationToken, TimerQueue};
use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle of the scheduler loop
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuntimeState {
    /// `run()` has never been called
    NotStarted,
    /// Inside `run()`
    Running,
    /// `run()` returned; calling it again starts a new run
    Stopped,
}

/// Runtime statistics
#[derive(Debug, Clone, Default)]
pub struct RuntimeStats {
    /// Total tasks spawned
    pub tasks_spawned: u64,

    /// Tasks whose body returned `Ok`
    pub tasks_completed: u64,

    /// Tasks whose body returned `Err`
    pub tasks_failed: u64,

    /// Tasks currently registered
    pub active_tasks: usize,

    /// Ticks executed
    pub ticks: u64,

    /// Timer callbacks run
    pub timers_fired: u64,
}

/// A task body that returned an error
#[derive(Debug)]
pub struct TaskFailure {
    /// The failed task
    pub task_id: TaskId,
    /// What the body returned
    pub error: anyhow::Error,
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,

    /// Live tasks; `TaskId` order is spawn order
    tasks: Mutex<BTreeMap<TaskId, Task>>,

    timers: Mutex<TimerQueue>,

    next_task_id: AtomicU64,

    state: AtomicCell<RuntimeState>,

    /// Set by `shutdown`; the earliest requested deadline wins
    shutdown_deadline: Mutex<Option<Instant>>,

    signal: Arc<WakeSignal>,

    stats: Mutex<RuntimeStats>,

    failures: Mutex<Vec<TaskFailure>>,
}

/// Handle to a cooperative runtime
///
/// Cheap to clone; every clone drives the same registry. A task can reach its
/// runtime through [`TaskContext::runtime`] to spawn siblings or schedule timers.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration and wall-clock time
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration and wall-clock time
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a runtime whose timers and shutdown deadlines follow `clock`
    pub fn with_clock(config: RuntimeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                config,
                clock,
                tasks: Mutex::new(BTreeMap::new()),
                timers: Mutex::new(TimerQueue::new()),
                next_task_id: AtomicU64::new(0),
                state: AtomicCell::new(RuntimeState::NotStarted),
                shutdown_deadline: Mutex::new(None),
                signal: WakeSignal::new(),
                stats: Mutex::new(RuntimeStats::default()),
                failures: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RuntimeInner>) -> Self {
        Self { inner }
    }

    /// Runtime name from the configuration
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The configuration this runtime was built with
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Current instant according to the runtime clock
    pub fn now(&self) -> Instant {
        self.inner.clock.now()
    }

    /// Create a mailbox that wakes this runtime on enqueue and close
    pub fn create_mailbox<M>(&self, config: MailboxConfig) -> Mailbox<M> {
        Mailbox::build(
            config,
            Some(self.inner.signal.notifier()),
            self.inner.config.mailbox_poll_interval(),
        )
    }

    /// Create a mailbox from the configured `default_mailbox`
    pub fn create_default_mailbox<M>(&self) -> Mailbox<M> {
        self.create_mailbox(self.inner.config.default_mailbox)
    }

    /// Create a future slot that wakes this runtime when it settles
    pub fn create_future_slot<T, E>(&self) -> FutureSlot<T, E> {
        FutureSlot::build(Some(self.inner.signal.notifier()))
    }

    /// Register a task; its body is invoked on the next tick
    pub fn spawn<F, Fut>(&self, body: F) -> TaskId
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = TaskId::from_u64(self.inner.next_task_id.fetch_add(1, Ordering::Relaxed));
        let task = Task::new(Box::new(move |cx: TaskContext| -> BoxedTask { Box::pin(body(cx)) }));

        let active = {
            let mut tasks = self.inner.tasks.lock();
            tasks.insert(id, task);
            tasks.len()
        };
        {
            let mut stats = self.inner.stats.lock();
            stats.tasks_spawned += 1;
            stats.active_tasks = active;
        }

        tracing::debug!(runtime = %self.name(), task = %id, "task spawned");
        self.inner.signal.notify();
        id
    }

    /// Run `callback` once, `delay` from now
    pub fn schedule_once<F>(&self, delay: Duration, callback: F) -> CancellationToken
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let mut timers = self.inner.timers.lock();
        timers.schedule_once(delay, callback, self.inner.clock.now())
    }

    /// Run `callback` after `initial_delay`, then every `interval`
    pub fn schedule_repeatedly<F>(
        &self,
        initial_delay: Duration,
        interval: Duration,
        callback: F,
    ) -> CancellationToken
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let mut timers = self.inner.timers.lock();
        timers.schedule_repeatedly(initial_delay, interval, callback, self.inner.clock.now())
    }

    /// Suspend the task owning `cx` until the next tick
    pub fn yield_now(&self, cx: &TaskContext) -> YieldNow {
        cx.yield_now()
    }

    /// Block the calling thread for `duration`
    ///
    /// Inside a task this stalls every other task and timer too; use
    /// [`yield_now`](Self::yield_now) or a timer to wait cooperatively.
    pub fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }

    /// Drive tasks and timers until shutdown completes or no work remains
    ///
    /// Fails with [`RuntimeError::AlreadyRunning`] when called from inside a
    /// running loop, and with [`RuntimeError::TimerCallback`] when a timer
    /// callback returns an error. Errors returned by task bodies only remove
    /// the failing task; see [`take_task_failures`](Self::take_task_failures).
    pub fn run(&self) -> Result<(), RuntimeError> {
        if self.inner.state.swap(RuntimeState::Running) == RuntimeState::Running {
            return Err(RuntimeError::AlreadyRunning);
        }
        *self.inner.shutdown_deadline.lock() = None;

        tracing::info!(runtime = %self.name(), tasks = self.task_count(), "runtime started");
        let result = self.run_loop();
        self.inner.state.store(RuntimeState::Stopped);

        match &result {
            Ok(()) => tracing::info!(runtime = %self.name(), "runtime stopped"),
            Err(err) => tracing::error!(runtime = %self.name(), error = %err, "runtime stopped"),
        }
        result
    }

    fn run_loop(&self) -> Result<(), RuntimeError> {
        let idle_sleep = self.inner.config.idle_sleep();
        loop {
            self.tick()?;

            if self.shutdown_complete() {
                return Ok(());
            }
            if !self.has_work() {
                tracing::debug!(runtime = %self.name(), "no tasks or timers left");
                return Ok(());
            }
            if !self.inner.signal.take() {
                thread::sleep(idle_sleep);
            }
        }
    }

    /// Execute a single tick: poll every task once, then fire due timers
    ///
    /// `run()` calls this in a loop; calling it directly drives the runtime
    /// step by step, which pairs well with a [`VirtualClock`](crate::clock::VirtualClock).
    pub fn tick(&self) -> Result<(), RuntimeError> {
        self.drive_tasks();
        let (fired, result) = self.advance_timers();

        let active = self.inner.tasks.lock().len();
        let mut stats = self.inner.stats.lock();
        stats.ticks += 1;
        stats.active_tasks = active;
        stats.timers_fired += fired as u64;
        drop(stats);

        result
    }

    fn drive_tasks(&self) {
        let ids: Vec<TaskId> = self.inner.tasks.lock().keys().copied().collect();
        let waker = Waker::from(Arc::clone(&self.inner.signal));
        let mut cx = Context::from_waker(&waker);

        for id in ids {
            let work = match self.inner.tasks.lock().get_mut(&id) {
                Some(task) => task.begin_poll(),
                None => None,
            };
            let Some(work) = work else { continue };

            let mut future = match work {
                TaskWork::Unstarted(body) => {
                    body(TaskContext::new(id, Arc::downgrade(&self.inner)))
                }
                TaskWork::Started(future) => future,
            };

            // No lock is held here: the task may spawn, schedule or enqueue freely
            match future.as_mut().poll(&mut cx) {
                Poll::Pending => {
                    if let Some(task) = self.inner.tasks.lock().get_mut(&id) {
                        task.suspend(future);
                    }
                }
                Poll::Ready(Ok(())) => {
                    self.inner.tasks.lock().remove(&id);
                    self.inner.stats.lock().tasks_completed += 1;
                    tracing::debug!(runtime = %self.name(), task = %id, "task completed");
                }
                Poll::Ready(Err(error)) => {
                    self.inner.tasks.lock().remove(&id);
                    self.inner.stats.lock().tasks_failed += 1;
                    tracing::warn!(runtime = %self.name(), task = %id, error = %error, "task failed");
                    self.inner.failures.lock().push(TaskFailure { task_id: id, error });
                }
            }
        }
    }

    /// Fire due timers; the count includes callbacks run before an error
    fn advance_timers(&self) -> (usize, Result<(), RuntimeError>) {
        // Callbacks may schedule more timers, so the queue is advanced unlocked
        let mut queue = std::mem::take(&mut *self.inner.timers.lock());
        let (fired, result) = queue.sweep(self.inner.clock.now());

        let mut timers = self.inner.timers.lock();
        let scheduled_meanwhile = std::mem::replace(&mut *timers, queue);
        timers.merge(scheduled_meanwhile);
        drop(timers);

        (fired, result.map_err(RuntimeError::TimerCallback))
    }

    /// Whether a requested shutdown has finished, abandoning tasks past the deadline
    fn shutdown_complete(&self) -> bool {
        let Some(deadline) = *self.inner.shutdown_deadline.lock() else {
            return false;
        };

        let abandoned = {
            let mut tasks = self.inner.tasks.lock();
            if tasks.is_empty() {
                None
            } else if self.inner.clock.now() >= deadline {
                Some(std::mem::take(&mut *tasks))
            } else {
                return false;
            }
        };

        match abandoned {
            None => tracing::info!(runtime = %self.name(), "shutdown complete"),
            Some(tasks) => {
                self.inner.stats.lock().active_tasks = 0;
                tracing::warn!(
                    runtime = %self.name(),
                    abandoned = tasks.len(),
                    "shutdown deadline passed, abandoning tasks"
                );
            }
        }
        true
    }

    /// Request the loop to stop once every task has finished
    ///
    /// Tasks still registered `timeout` after the request are dropped without
    /// being polled again. Pending timers never delay shutdown.
    pub fn shutdown(&self, timeout: Duration) {
        let deadline = deadline_after(self.inner.clock.now(), timeout);
        {
            let mut requested = self.inner.shutdown_deadline.lock();
            *requested = Some(match *requested {
                Some(earlier) => earlier.min(deadline),
                None => deadline,
            });
        }
        tracing::info!(runtime = %self.name(), timeout = ?timeout, "shutdown requested");
        self.inner.signal.notify();
    }

    /// Whether the loop is inside `run()`
    pub fn is_running(&self) -> bool {
        self.inner.state.load() == RuntimeState::Running
    }

    /// Current lifecycle state
    pub fn state(&self) -> RuntimeState {
        self.inner.state.load()
    }

    /// Number of registered tasks
    pub fn task_count(&self) -> usize {
        self.inner.tasks.lock().len()
    }

    /// State of a registered task, `None` once it finished
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.inner.tasks.lock().get(&id).map(Task::state)
    }

    /// Whether any task is registered or any live timer is queued
    pub fn has_work(&self) -> bool {
        !self.inner.tasks.lock().is_empty() || self.inner.timers.lock().has_pending()
    }

    /// Number of timers queued, including cancelled ones not yet purged
    pub fn timer_count(&self) -> usize {
        self.inner.timers.lock().len()
    }

    /// Snapshot of the runtime statistics
    pub fn stats(&self) -> RuntimeStats {
        self.inner.stats.lock().clone()
    }

    /// Drain the recorded task failures, oldest first
    pub fn take_task_failures(&self) -> Vec<TaskFailure> {
        std::mem::take(&mut *self.inner.failures.lock())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("tasks", &self.task_count())
            .field("timers", &self.timer_count())
            .finish()
    }
}
