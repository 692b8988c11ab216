//! Nexus Runtime
//!
//! Single-threaded cooperative core for actor systems:
//!
//! - [`Runtime`]: task registry and scheduler loop
//! - [`TimerQueue`] and [`CancellationToken`]: deadline-ordered callbacks
//! - [`Mailbox`]: per-task message queue with overflow policies
//! - [`FutureSlot`]: write-once result a task can wait on
//!
//! ```ignore
//! use nexus_runtime::{MailboxConfig, Runtime};
//!
//! let runtime = Runtime::new();
//! let mailbox = runtime.create_mailbox::<String>(MailboxConfig::unbounded());
//!
//! let inbox = mailbox.clone();
//! runtime.spawn(move |cx| async move {
//!     let greeting = inbox.dequeue_blocking(&cx).await?;
//!     println!("{greeting}");
//!     Ok::<_, anyhow::Error>(())
//! });
//!
//! mailbox.enqueue("hello".to_string())?;
//! runtime.run()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod clock;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod sync;
pub mod timer;

pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{MailboxConfig, OverflowStrategy, RuntimeConfig};
pub use error::{ConfigError, FutureError, MailboxError, RuntimeError};
pub use scheduler::{Runtime, RuntimeState, RuntimeStats, TaskContext, TaskFailure, TaskId, TaskState};
pub use sync::{EnqueueResult, FutureSlot, Mailbox};
pub use timer::{CancellationToken, TimerQueue};
