//! Error types for the hybrid lock and its monitor-condition bridge

use thiserror::Error;

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, LockError>;

/// Errors that can occur while acquiring or operating on a [`crate::reentrant::ReentrantLock`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// An operation was attempted outside the context it requires, e.g.
    /// releasing a lock not held or signalling a condition whose lock the
    /// caller does not own.
    #[error("illegal state: {reason}")]
    IllegalState {
        /// Description of the violated precondition
        reason: String,
    },

    /// A blocking acquisition observed its cancellation token set.
    #[error("lock acquisition interrupted")]
    Interrupted,

    /// A timed acquisition reached its deadline without succeeding.
    #[error("lock acquisition timed out after {elapsed_ms}ms")]
    Timeout {
        /// Time actually waited, in milliseconds
        elapsed_ms: u64,
    },
}

impl LockError {
    /// Build an [`LockError::IllegalState`] with the given reason.
    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::IllegalState {
            reason: reason.into(),
        }
    }

    /// Build a [`LockError::Timeout`] for the given elapsed duration.
    pub fn timeout(elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_state_carries_reason() {
        let err = LockError::illegal_state("release without ownership");
        assert!(format!("{err}").contains("release without ownership"));
    }
}
