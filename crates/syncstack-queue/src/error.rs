//! Error types for the queue family

use thiserror::Error;

/// Result type for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur while operating on a queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Inserting a null/absent element was rejected at enqueue time
    #[error("cannot enqueue a null element")]
    NullElement,

    /// A bounded queue has no free capacity
    #[error("queue at capacity ({capacity})")]
    Full {
        /// The configured capacity
        capacity: usize,
    },

    /// A blocking operation was interrupted before it could complete
    #[error("operation interrupted while waiting")]
    Interrupted,

    /// A timed operation reached its deadline without completing
    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Time actually waited, in milliseconds
        elapsed_ms: u64,
    },
}

impl QueueError {
    /// Build a [`QueueError::Full`] for the given capacity
    pub fn full(capacity: usize) -> Self {
        Self::Full { capacity }
    }

    /// Build a [`QueueError::Timeout`] for the given elapsed duration
    pub fn timeout(elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}
