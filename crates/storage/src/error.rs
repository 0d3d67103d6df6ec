//! Queue status errors.

use thiserror::Error;

/// Non-fatal queue outcomes. Both variants carry how much work was done
/// before the condition was hit.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue full after pushing {pushed} item(s)")]
    Full { pushed: usize },

    #[error("queue empty after popping {popped} item(s)")]
    Empty { popped: usize },
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
