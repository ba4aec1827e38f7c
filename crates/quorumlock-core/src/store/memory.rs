// In-process conditional-write store
// Records expire on the tokio clock, so paused-time tests drive TTL expiry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::time::Instant;
use tracing::trace;

use super::StoreConn;
use crate::context::LockContext;
use crate::error::StoreError;
use crate::token::LockToken;

struct Record {
    token: LockToken,
    expires_at: Instant,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// `DashMap`-backed store with fault injection.
///
/// Each operation runs under a single entry guard, which makes it atomic
/// with respect to every other caller of the same store.
pub struct MemoryStore {
    name: String,
    records: DashMap<String, Record>,
    online: AtomicBool,
    stalled: AtomicBool,
    drop_replies: AtomicBool,
    latency_ms: AtomicU64,
    jitter_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: DashMap::new(),
            online: AtomicBool::new(true),
            stalled: AtomicBool::new(false),
            drop_replies: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            jitter_ms: AtomicU64::new(0),
        }
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Add a uniformly random extra delay in `[0, jitter]` to every answer.
    pub fn with_jitter(self, jitter: Duration) -> Self {
        self.jitter_ms
            .store(jitter.as_millis() as u64, Ordering::Relaxed);
        self
    }

    /// An offline store answers every call with `StoreError::Unavailable`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// A stalled store never answers; callers must time out.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::Relaxed);
    }

    /// Operations are applied but the reply never arrives.
    pub fn set_drop_replies(&self, drop_replies: bool) {
        self.drop_replies.store(drop_replies, Ordering::Relaxed);
    }

    /// Live value under `key`, bypassing fault injection.
    pub fn peek(&self, key: &str) -> Option<LockToken> {
        let now = Instant::now();
        self.records
            .get(key)
            .filter(|record| record.is_live(now))
            .map(|record| record.token.clone())
    }

    /// Number of live records.
    pub fn record_count(&self) -> usize {
        let now = Instant::now();
        self.records.iter().filter(|r| r.is_live(now)).count()
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    fn delay_ms(&self) -> u64 {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        match self.jitter_ms.load(Ordering::Relaxed) {
            0 => latency,
            jitter => latency + rand::rng().random_range(0..=jitter),
        }
    }

    async fn reach(&self) -> Result<(), StoreError> {
        let latency = self.delay_ms();
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.stalled.load(Ordering::Relaxed) {
            std::future::pending::<()>().await;
        }
        if !self.is_online() {
            return Err(StoreError::Unavailable(self.name.clone()));
        }
        Ok(())
    }

    async fn reply<T>(&self, value: T) -> Result<T, StoreError> {
        if self.drop_replies.load(Ordering::Relaxed) {
            std::future::pending::<()>().await;
        }
        Ok(value)
    }

    fn put_if(&self, key: &str, token: &LockToken, ttl: Duration, allow_equal: bool) -> bool {
        let now = Instant::now();
        let record = Record {
            token: token.clone(),
            expires_at: now + ttl,
        };

        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if !current.is_live(now) || (allow_equal && current.token == *token) {
                    entry.insert(record);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
        }
    }
}

#[async_trait]
impl StoreConn for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_if_absent(
        &self,
        _ctx: &LockContext,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.reach().await?;
        let written = self.put_if(key, token, ttl, false);
        trace!(store = %self.name, key = %key, written, "set_if_absent");
        self.reply(written).await
    }

    async fn set_if_absent_or_equal(
        &self,
        _ctx: &LockContext,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.reach().await?;
        let written = self.put_if(key, token, ttl, true);
        trace!(store = %self.name, key = %key, written, "set_if_absent_or_equal");
        self.reply(written).await
    }

    async fn delete_if_equals(
        &self,
        _ctx: &LockContext,
        key: &str,
        token: &LockToken,
    ) -> Result<bool, StoreError> {
        self.reach().await?;
        let now = Instant::now();
        let removed = self
            .records
            .remove_if(key, |_, record| {
                record.is_live(now) && record.token == *token
            })
            .is_some();
        trace!(store = %self.name, key = %key, removed, "delete_if_equals");
        self.reply(removed).await
    }

    async fn get(&self, _ctx: &LockContext, key: &str) -> Result<Option<LockToken>, StoreError> {
        self.reach().await?;
        let value = self.peek(key);
        self.reply(value).await
    }

    async fn ping(&self, _ctx: &LockContext) -> Result<(), StoreError> {
        self.reach().await?;
        self.reply(()).await
    }
}
