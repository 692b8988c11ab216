//! Task identity, state and the per-task context handle

use crate::scheduler::runtime::{Runtime, RuntimeInner};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

/// Unique identifier for a Task, allocated by its runtime in spawn order
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a TaskId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        TaskId(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// State of a Task still held by the runtime
///
/// Finished tasks are removed from the registry, so there is no terminal state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Spawned, body not invoked yet
    Created,
    /// Being polled by the current tick
    Running,
    /// Parked at a suspension point until the next tick
    Suspended,
}

pub(crate) type BoxedTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;
pub(crate) type TaskBody = Box<dyn FnOnce(TaskContext) -> BoxedTask + Send + 'static>;

/// What the runtime polls for a task
pub(crate) enum TaskWork {
    /// The body, invoked on the task's first tick
    Unstarted(TaskBody),
    /// The running body, parked at a suspension point
    Started(BoxedTask),
}

/// A registered cooperative task
pub(crate) struct Task {
    state: TaskState,
    /// Taken out while the task is being polled
    work: Option<TaskWork>,
}

impl Task {
    pub(crate) fn new(body: TaskBody) -> Self {
        Self {
            state: TaskState::Created,
            work: Some(TaskWork::Unstarted(body)),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state
    }

    /// Hand the work to the driver for one poll
    pub(crate) fn begin_poll(&mut self) -> Option<TaskWork> {
        let work = self.work.take()?;
        self.state = TaskState::Running;
        Some(work)
    }

    /// Park the task after a `Pending` poll
    pub(crate) fn suspend(&mut self, future: BoxedTask) {
        self.work = Some(TaskWork::Started(future));
        self.state = TaskState::Suspended;
    }
}

/// Handle passed to a task body
///
/// Suspension points take the context explicitly, so mailbox waits and
/// future waits always know which task they are parking.
#[derive(Clone)]
pub struct TaskContext {
    id: TaskId,
    runtime: Weak<RuntimeInner>,
}

impl TaskContext {
    pub(crate) fn new(id: TaskId, runtime: Weak<RuntimeInner>) -> Self {
        Self { id, runtime }
    }

    /// Context for a task that belongs to no runtime (unit tests)
    #[cfg(test)]
    pub(crate) fn detached(id: TaskId) -> Self {
        Self::new(id, Weak::new())
    }

    /// ID of the task this context belongs to
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The owning runtime, if it is still alive
    ///
    /// The returned handle is strong. Held across an `.await`, it lives inside
    /// the suspended task, which the runtime itself owns, so the runtime stays
    /// alive until that task finishes or is abandoned at shutdown. Call this
    /// again after each suspension point instead of keeping the handle.
    pub fn runtime(&self) -> Option<Runtime> {
        self.runtime.upgrade().map(Runtime::from_inner)
    }

    /// Suspend the task until the next tick, unconditionally
    pub fn yield_now(&self) -> YieldNow {
        YieldNow::new()
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext").field("id", &self.id).finish()
    }
}

/// Future that is pending exactly once
///
/// It does not wake the waker: the runtime resumes every suspended task once
/// per tick on its own schedule.
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct YieldNow {
    yielded: bool,
}

impl YieldNow {
    /// Create a future that yields once
    pub fn new() -> Self {
        Self::default()
    }
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            Poll::Pending
        }
    }
}
