//! Error types for lock operations
//!
//! - `StoreError`: a single store failed to answer. Counted as a failed vote
//!   inside the pool and never surfaced to lock callers on its own.
//! - `LockError`: the aggregate outcome surfaced by `LockManager`.

use std::time::Duration;

use crate::handle::LockState;

/// Per-store transport or backend failure
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store '{0}' unavailable")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Lock operation errors
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error(
        "lock '{name}' unavailable: best attempt reached {acquired} of {quorum} required stores after {attempts} attempt(s)"
    )]
    LockUnavailable {
        name: String,
        attempts: u32,
        acquired: usize,
        quorum: usize,
    },

    #[error("lock '{name}' lost: quorum could not be maintained")]
    LockLost { name: String },

    #[error("lock '{name}' is no longer held ({state})")]
    LockAlreadyReleased { name: String, state: LockState },

    #[error("lock '{name}' operation cancelled")]
    Cancelled { name: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LockError {
    /// Whether the caller may simply try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::LockUnavailable { .. } | LockError::Cancelled { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LockError::LockUnavailable {
            name: "orders".to_string(),
            attempts: 3,
            acquired: 1,
            quorum: 2,
        };
        assert_eq!(
            err.to_string(),
            "lock 'orders' unavailable: best attempt reached 1 of 2 required stores after 3 attempt(s)"
        );

        let err = LockError::LockLost {
            name: "orders".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "lock 'orders' lost: quorum could not be maintained"
        );

        let err = LockError::LockAlreadyReleased {
            name: "orders".to_string(),
            state: LockState::Released,
        };
        assert_eq!(err.to_string(), "lock 'orders' is no longer held (released)");

        let err = StoreError::Timeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "store call timed out after 50ms");
    }

    #[test]
    fn test_retryable() {
        assert!(
            LockError::LockUnavailable {
                name: "a".to_string(),
                attempts: 1,
                acquired: 0,
                quorum: 2,
            }
            .is_retryable()
        );
        assert!(
            !LockError::LockLost {
                name: "a".to_string()
            }
            .is_retryable()
        );
        assert!(!LockError::InvalidArgument("ttl".to_string()).is_retryable());
    }
}
