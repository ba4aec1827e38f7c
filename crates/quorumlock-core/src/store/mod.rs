//! Conditional-write store abstraction
//!
//! A lock record is `key -> token` with a store-managed expiry. Every method
//! must be a single atomic operation at the store: a read followed by a
//! separate write would let two callers both observe "absent" and both write.

mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::context::LockContext;
use crate::error::StoreError;
use crate::token::LockToken;

pub use memory::MemoryStore;

/// One key-value store endpoint.
#[async_trait]
pub trait StoreConn: Send + Sync {
    /// Endpoint identifier used in logs and metrics.
    fn name(&self) -> &str;

    /// Write `key -> token` expiring after `ttl` only if the key holds no live
    /// record. Returns `false` without side effects if a record exists.
    async fn set_if_absent(
        &self,
        ctx: &LockContext,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Write `key -> token` expiring after `ttl` if the key is absent or
    /// already holds `token`. Used to extend a held lock; an unconditional
    /// overwrite here would let an extension steal someone else's lock.
    async fn set_if_absent_or_equal(
        &self,
        ctx: &LockContext,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove the record only if it holds `token`.
    async fn delete_if_equals(
        &self,
        ctx: &LockContext,
        key: &str,
        token: &LockToken,
    ) -> Result<bool, StoreError>;

    /// Current value, for introspection only. Never used to decide an acquire.
    async fn get(&self, ctx: &LockContext, key: &str) -> Result<Option<LockToken>, StoreError>;

    /// Health probe.
    async fn ping(&self, _ctx: &LockContext) -> Result<(), StoreError> {
        Ok(())
    }
}
