//! Fan-out of lock operations to N independent stores
//!
//! Every store call runs concurrently, bounded by its own timeout and raced
//! against the caller's context. Per-store failures are counted, logged and
//! never surfaced individually.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{Instrument, debug, debug_span, warn};

use crate::context::LockContext;
use crate::error::{LockError, Result, StoreError};
use crate::metrics;
use crate::quorum_of;
use crate::store::StoreConn;
use crate::token::LockToken;

/// Per-store timeouts never exceed this fraction of the lock TTL.
pub const TTL_TIMEOUT_DIVISOR: u32 = 10;

/// One store endpoint together with its call timeout.
#[derive(Clone)]
pub struct PoolMember {
    pub conn: Arc<dyn StoreConn>,
    pub timeout: Duration,
}

impl PoolMember {
    pub fn new(conn: Arc<dyn StoreConn>, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    fn timeout_for(&self, ttl: Option<Duration>) -> Duration {
        match ttl {
            Some(ttl) => self.timeout.min(ttl / TTL_TIMEOUT_DIVISOR),
            None => self.timeout,
        }
    }
}

impl std::fmt::Debug for PoolMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolMember")
            .field("store", &self.conn.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Outcome of a conditional write fanned out to every store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuorumTally {
    /// Stores in the pool
    pub total: usize,
    /// Stores that accepted the write
    pub succeeded: usize,
    /// Stores that answered but refused (record held by another token)
    pub rejected: usize,
    /// Stores that errored or timed out
    pub failed: usize,
    /// The caller's context ended before every store answered
    pub cancelled: bool,
}

impl QuorumTally {
    pub fn reached(&self, quorum: usize) -> bool {
        self.succeeded >= quorum
    }
}

/// Health probe result for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    pub store: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum Reply<T> {
    Answered(T),
    Failed(StoreError),
    Cancelled,
}

/// Immutable set of store connections shared by every lock operation.
#[derive(Debug)]
pub struct QuorumPool {
    members: Vec<PoolMember>,
}

impl QuorumPool {
    pub fn new(members: Vec<PoolMember>) -> Result<Self> {
        if members.is_empty() {
            return Err(LockError::Config(
                "quorum pool needs at least one store".to_string(),
            ));
        }
        if members.len() % 2 == 0 {
            warn!(
                stores = members.len(),
                "Even number of stores tolerates no more failures than one store fewer"
            );
        }
        Ok(Self { members })
    }

    /// Pool where every store shares the same call timeout.
    pub fn from_stores(stores: Vec<Arc<dyn StoreConn>>, timeout: Duration) -> Result<Self> {
        Self::new(
            stores
                .into_iter()
                .map(|conn| PoolMember::new(conn, timeout))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Strict majority of the pool.
    pub fn quorum(&self) -> usize {
        quorum_of(self.members.len())
    }

    pub fn members(&self) -> &[PoolMember] {
        &self.members
    }

    /// `set_if_absent` on every store.
    pub async fn try_acquire_all(
        &self,
        ctx: &LockContext,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> QuorumTally {
        let replies = self
            .fan_out(ctx, "set_if_absent", Some(ttl), |conn| {
                conn.set_if_absent(ctx, key, token, ttl)
            })
            .await;
        Self::tally(replies)
    }

    /// `set_if_absent_or_equal` on every store.
    pub async fn extend_all(
        &self,
        ctx: &LockContext,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> QuorumTally {
        let replies = self
            .fan_out(ctx, "set_if_absent_or_equal", Some(ttl), |conn| {
                conn.set_if_absent_or_equal(ctx, key, token, ttl)
            })
            .await;
        Self::tally(replies)
    }

    /// Best-effort `delete_if_equals` on every store.
    ///
    /// Individual failures are logged and dropped: record TTLs clear whatever
    /// this misses. Returns the number of records actually removed.
    pub async fn release_all(&self, ctx: &LockContext, key: &str, token: &LockToken) -> usize {
        let replies = self
            .fan_out(ctx, "delete_if_equals", None, |conn| {
                conn.delete_if_equals(ctx, key, token)
            })
            .await;

        replies
            .into_iter()
            .filter(|reply| matches!(reply, Reply::Answered(true)))
            .count()
    }

    /// Current value on every store, in pool order. `None` for absent records
    /// and for stores that could not answer.
    pub async fn get_all(&self, ctx: &LockContext, key: &str) -> Vec<Option<LockToken>> {
        self.fan_out(ctx, "get", None, |conn| conn.get(ctx, key))
            .await
            .into_iter()
            .map(|reply| match reply {
                Reply::Answered(value) => value,
                Reply::Failed(_) | Reply::Cancelled => None,
            })
            .collect()
    }

    /// Number of stores currently holding `token` under `key`.
    pub async fn count_matching(&self, ctx: &LockContext, key: &str, token: &LockToken) -> usize {
        self.get_all(ctx, key)
            .await
            .iter()
            .filter(|value| value.as_ref() == Some(token))
            .count()
    }

    pub async fn ping_all(&self, ctx: &LockContext) -> Vec<StoreHealth> {
        let replies = self.fan_out(ctx, "ping", None, |conn| conn.ping(ctx)).await;

        self.members
            .iter()
            .zip(replies)
            .map(|(member, reply)| {
                let error = match reply {
                    Reply::Answered(()) => None,
                    Reply::Failed(e) => Some(e.to_string()),
                    Reply::Cancelled => Some("cancelled".to_string()),
                };
                StoreHealth {
                    store: member.conn.name().to_string(),
                    healthy: error.is_none(),
                    error,
                }
            })
            .collect()
    }

    async fn fan_out<'a, T, F, Fut>(
        &'a self,
        ctx: &'a LockContext,
        op: &'static str,
        ttl: Option<Duration>,
        call: F,
    ) -> Vec<Reply<T>>
    where
        F: Fn(&'a dyn StoreConn) -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>> + 'a,
    {
        let calls = self.members.iter().map(|member| {
            let store = member.conn.name();
            let timeout = member.timeout_for(ttl);
            let pending = call(member.conn.as_ref());
            let span = debug_span!("store_call", store = %store, op);

            async move {
                let reply = tokio::select! {
                    biased;
                    _ = ctx.done() => Reply::Cancelled,
                    res = tokio::time::timeout(timeout, pending) => match res {
                        Ok(Ok(value)) => Reply::Answered(value),
                        Ok(Err(e)) => Reply::Failed(e),
                        Err(_) => Reply::Failed(StoreError::Timeout(timeout)),
                    },
                };
                if let Reply::Failed(ref e) = reply {
                    debug!(error = %e, "Store call failed");
                    metrics::record_store_error(store, op);
                }
                reply
            }
            .instrument(span)
        });

        join_all(calls).await
    }

    fn tally(replies: Vec<Reply<bool>>) -> QuorumTally {
        let mut tally = QuorumTally {
            total: replies.len(),
            ..Default::default()
        };
        for reply in replies {
            match reply {
                Reply::Answered(true) => tally.succeeded += 1,
                Reply::Answered(false) => tally.rejected += 1,
                Reply::Failed(_) => tally.failed += 1,
                Reply::Cancelled => tally.cancelled = true,
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const TTL: Duration = Duration::from_secs(10);

    fn pool_of(n: usize) -> (QuorumPool, Vec<Arc<MemoryStore>>) {
        let stores: Vec<Arc<MemoryStore>> = (0..n)
            .map(|i| Arc::new(MemoryStore::new(format!("store-{}", i))))
            .collect();
        let conns = stores
            .iter()
            .map(|s| s.clone() as Arc<dyn StoreConn>)
            .collect();
        let pool = QuorumPool::from_stores(conns, Duration::from_millis(50)).unwrap();
        (pool, stores)
    }

    #[test]
    fn test_empty_pool_rejected() {
        let err = QuorumPool::new(Vec::new()).unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
    }

    #[test]
    fn test_member_timeout_capped_by_ttl() {
        let member = PoolMember::new(Arc::new(MemoryStore::new("s")), Duration::from_millis(500));
        assert_eq!(member.timeout_for(None), Duration::from_millis(500));
        assert_eq!(
            member.timeout_for(Some(Duration::from_secs(10))),
            Duration::from_millis(500)
        );
        assert_eq!(
            member.timeout_for(Some(Duration::from_secs(1))),
            Duration::from_millis(100)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_all_counts_outcomes() {
        let (pool, stores) = pool_of(5);
        let ctx = LockContext::new();
        let other = LockToken::from("other");
        let mine = LockToken::from("mine");

        stores[0]
            .set_if_absent(&ctx, "k", &other, TTL)
            .await
            .unwrap();
        stores[1].set_online(false);
        stores[2].set_stalled(true);

        let tally = pool.try_acquire_all(&ctx, "k", &mine, TTL).await;
        assert_eq!(
            tally,
            QuorumTally {
                total: 5,
                succeeded: 2,
                rejected: 1,
                failed: 2,
                cancelled: false,
            }
        );
        assert!(!tally.reached(pool.quorum()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_all_only_removes_own_token() {
        let (pool, stores) = pool_of(3);
        let ctx = LockContext::new();
        let mine = LockToken::from("mine");
        let other = LockToken::from("other");

        stores[0].set_if_absent(&ctx, "k", &other, TTL).await.unwrap();
        pool.try_acquire_all(&ctx, "k", &mine, TTL).await;

        assert_eq!(pool.release_all(&ctx, "k", &mine).await, 2);
        assert_eq!(stores[0].peek("k"), Some(other));
        assert_eq!(stores[1].peek("k"), None);
        assert_eq!(stores[2].peek("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_context_short_circuits() {
        let (pool, stores) = pool_of(3);
        let ctx = LockContext::new();
        ctx.cancel();

        let tally = pool
            .try_acquire_all(&ctx, "k", &LockToken::from("mine"), TTL)
            .await;
        assert!(tally.cancelled);
        assert_eq!(tally.succeeded, 0);
        assert!(stores.iter().all(|s| s.record_count() == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_matching_and_ping() {
        let (pool, stores) = pool_of(3);
        let ctx = LockContext::new();
        let mine = LockToken::from("mine");

        pool.try_acquire_all(&ctx, "k", &mine, TTL).await;
        stores[2].set_online(false);
        assert_eq!(pool.count_matching(&ctx, "k", &mine).await, 2);

        let health = pool.ping_all(&ctx).await;
        assert_eq!(health.len(), 3);
        assert!(health[0].healthy && health[1].healthy);
        assert!(!health[2].healthy);
        assert_eq!(health[2].store, "store-2");
    }
}
