//! Runtime and mailbox configuration
//!
//! Both structs deserialize from TOML; missing fields fall back to defaults.
//!
//! ```toml
//! name = "edge"
//! idle_sleep_micros = 250
//!
//! [default_mailbox]
//! bounded = true
//! capacity = 64
//! strategy = "drop_oldest"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default runtime name
pub const DEFAULT_RUNTIME_NAME: &str = "cooperative";

/// Default sleep between ticks when nothing woke the loop
pub const DEFAULT_IDLE_SLEEP: Duration = Duration::from_micros(100);

/// Default poll interval for blocking mailbox reads outside a task
pub const DEFAULT_MAILBOX_POLL: Duration = Duration::from_micros(100);

/// What a bounded mailbox does when `enqueue` is called at capacity
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Discard the incoming message
    DropNewest,
    /// Discard the oldest queued message, then accept the incoming one
    DropOldest,
    /// Queue nothing and report backpressure to the caller
    Backpressure,
    /// Fail the enqueue with [`MailboxError::Overflow`](crate::error::MailboxError::Overflow)
    RejectWithError,
}

/// Capacity and overflow policy of a mailbox
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Whether `capacity` applies
    pub bounded: bool,
    /// Maximum queued messages (ignored when unbounded)
    pub capacity: usize,
    /// Policy applied when a bounded mailbox is full
    pub strategy: OverflowStrategy,
}

impl MailboxConfig {
    /// A mailbox that accepts every message
    pub fn unbounded() -> Self {
        Self {
            bounded: false,
            capacity: 0,
            strategy: OverflowStrategy::DropNewest,
        }
    }

    /// A mailbox holding at most `capacity` messages
    pub fn bounded(capacity: usize, strategy: OverflowStrategy) -> Self {
        Self {
            bounded: true,
            capacity,
            strategy,
        }
    }

    /// Capacity limit, `None` for unbounded mailboxes
    pub fn limit(&self) -> Option<usize> {
        self.bounded.then_some(self.capacity)
    }

    /// Reject configurations that can never accept a message
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bounded && self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Scheduler loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name reported by `Runtime::name()`
    pub name: String,

    /// Sleep between ticks when no wakeup arrived, in microseconds
    pub idle_sleep_micros: u64,

    /// Poll interval of `dequeue_blocking_timeout` for runtime mailboxes, in microseconds
    pub mailbox_poll_micros: u64,

    /// Config used by `Runtime::create_default_mailbox`
    pub default_mailbox: MailboxConfig,
}

impl RuntimeConfig {
    /// Parse a config from TOML, validating the default mailbox
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.default_mailbox.validate()?;
        Ok(config)
    }

    /// Set the runtime name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the idle sleep between ticks
    pub fn with_idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep_micros = sleep.as_micros() as u64;
        self
    }

    /// Idle sleep as a `Duration`
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.idle_sleep_micros)
    }

    /// Mailbox poll interval as a `Duration`
    pub fn mailbox_poll_interval(&self) -> Duration {
        Duration::from_micros(self.mailbox_poll_micros)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_RUNTIME_NAME.to_string(),
            idle_sleep_micros: DEFAULT_IDLE_SLEEP.as_micros() as u64,
            mailbox_poll_micros: DEFAULT_MAILBOX_POLL.as_micros() as u64,
            default_mailbox: MailboxConfig::unbounded(),
        }
    }
}
