//! Runtime error types.

use crate::config::OverflowStrategy;

/// Errors surfaced by [`Mailbox`](crate::sync::Mailbox) operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    /// The mailbox was closed (or a non-task blocking read timed out)
    #[error("Mailbox is closed")]
    Closed,

    /// A bounded mailbox configured to reject was at capacity
    #[error("Mailbox overflow: capacity {capacity} reached (strategy {strategy:?})")]
    Overflow {
        /// Configured capacity
        capacity: usize,
        /// Configured overflow strategy
        strategy: OverflowStrategy,
    },
}

/// Outcome errors surfaced when awaiting a [`FutureSlot`](crate::sync::FutureSlot)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FutureError<E> {
    /// The producer failed the future
    #[error("Future failed: {0}")]
    Failed(E),

    /// The future was cancelled before it was resolved
    #[error("Future was cancelled")]
    Cancelled,
}

/// Errors that stop the scheduler loop
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// `run()` was called while the loop was already running
    #[error("Runtime is already running")]
    AlreadyRunning,

    /// A timer callback returned an error
    #[error("Timer callback failed: {0}")]
    TimerCallback(anyhow::Error),
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed into a config
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A bounded mailbox must hold at least one message
    #[error("Bounded mailbox capacity must be greater than zero")]
    ZeroCapacity,
}
