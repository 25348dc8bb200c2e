//! Error types for the ordered task wrapper and its executor collaborators

use thiserror::Error;

/// Result type for ordered-task operations
pub type Result<T> = std::result::Result<T, OrderedTaskError>;

/// Errors surfaced by the ordered task wrapper and its expirable-task
/// collaborator.
#[derive(Error, Debug)]
pub enum OrderedTaskError {
    /// A wrapped task (or a chained successor run inline after it) panicked.
    /// The first panic in a per-key run is kept as the primary failure; any
    /// further panics encountered while continuing the chain are counted
    /// here rather than lost, since Rust panics carry no native "suppressed"
    /// list the way the source design's exceptions do.
    #[error("task panicked: {message} ({suppressed} further panic(s) suppressed)")]
    TaskPanicked {
        /// A best-effort description of the panic payload.
        message: String,
        /// Count of additional panics swallowed while continuing the chain.
        suppressed: usize,
    },

    /// An [`crate::executor::ExpirableTask`] reached its deadline before an
    /// executor thread began running it.
    #[error("task expired before it began executing")]
    Expired,
}

impl OrderedTaskError {
    /// Build a [`OrderedTaskError::TaskPanicked`] from a caught panic
    /// payload, describing it as best as the payload's concrete type allows.
    pub(crate) fn from_panic_payload(payload: Box<dyn std::any::Any + Send>, suppressed: usize) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::TaskPanicked { message, suppressed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_extracts_string_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom".to_string());
        let err = OrderedTaskError::from_panic_payload(payload, 2);
        match err {
            OrderedTaskError::TaskPanicked { message, suppressed } => {
                assert_eq!(message, "boom");
                assert_eq!(suppressed, 2);
            }
            _ => panic!("wrong variant"),
        }
    }
}
