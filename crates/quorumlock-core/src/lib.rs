//! Quorumlock Core - quorum-based distributed mutual exclusion
//!
//! This crate provides:
//! - The conditional-write store abstraction (`StoreConn`) and an in-memory store
//! - Fan-out of lock operations to N independent stores (`QuorumPool`)
//! - The acquire / extend / release algorithm (`LockManager`)
//! - Lock handles, retry policies and a keep-alive task
//!
//! A lock is held while a strict majority of stores carry the acquisition
//! token under the lock key and the elapsed acquisition time, minus a clock
//! drift margin, still leaves positive validity.

pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod keepalive;
pub mod manager;
pub mod metrics;
pub mod pool;
pub mod retry;
pub mod store;
pub mod token;

// Re-exports for convenience
pub use config::{LockConfig, PoolConfig, RetryConfig, StoreConfig};
pub use context::LockContext;
pub use error::{LockError, Result, StoreError};
pub use handle::{LockHandle, LockIdentity, LockState};
pub use keepalive::KeepAlive;
pub use manager::LockManager;
pub use pool::{PoolMember, QuorumPool, QuorumTally, StoreHealth};
pub use retry::{ExponentialBackoff, FixedDelay, RandomDelay, RetryPolicy};
pub use store::{MemoryStore, StoreConn};
pub use token::LockToken;

/// Strict majority of `n` stores.
pub const fn quorum_of(n: usize) -> usize {
    n / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_of() {
        assert_eq!(quorum_of(1), 1);
        assert_eq!(quorum_of(2), 2);
        assert_eq!(quorum_of(3), 2);
        assert_eq!(quorum_of(4), 3);
        assert_eq!(quorum_of(5), 3);
        assert_eq!(quorum_of(7), 4);
    }
}
