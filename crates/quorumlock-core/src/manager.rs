//! Lock Manager - acquire, extend, release and validity checks
//!
//! Acquire writes a fresh token to every store with a conditional
//! set-if-absent. The lock is held when a strict majority accepted and the
//! time spent doing so, plus a drift margin, still leaves positive validity:
//!
//! ```text
//! validity = ttl - elapsed - (ttl * drift_factor + drift_constant)
//! deadline = t0 + validity
//! ```
//!
//! Any two majorities of the same pool share at least one store, and a store
//! cannot hold two tokens under one key, so at most one caller holds a quorum.
//! Attempts that fail, or are cancelled mid-flight, remove whatever records
//! they managed to write; record TTLs clean up anything that cleanup misses.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LockConfig;
use crate::context::LockContext;
use crate::error::{LockError, Result};
use crate::handle::{LockHandle, LockIdentity, LockState};
use crate::metrics;
use crate::pool::{QuorumPool, QuorumTally, StoreHealth};
use crate::retry::RetryPolicy;
use crate::token::LockToken;

enum Attempt {
    Held(LockHandle),
    Failed(QuorumTally),
    Cancelled,
}

/// Orchestrates the quorum lock protocol over a shared `QuorumPool`.
///
/// Safe to share between tasks; concurrent operations on different handles
/// only read the pool.
#[derive(Debug)]
pub struct LockManager {
    pool: Arc<QuorumPool>,
    retry: Arc<dyn RetryPolicy>,
    config: LockConfig,
}

impl LockManager {
    pub fn new(pool: Arc<QuorumPool>, config: LockConfig) -> Result<Self> {
        config.validate()?;
        let retry = config.retry.build();
        Ok(Self {
            pool,
            retry,
            config,
        })
    }

    /// Replace the configured backoff strategy.
    pub fn with_retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &Arc<QuorumPool> {
        &self.pool
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn quorum(&self) -> usize {
        self.pool.quorum()
    }

    /// Store key for a lock name. Identical on every store.
    pub fn key_for(&self, name: &str) -> String {
        format!("{}{}", self.config.key_prefix, name)
    }

    /// Safety deduction for clock skew between this process and the stores.
    pub fn drift(&self, ttl: Duration) -> Duration {
        ttl.mul_f64(self.config.drift_factor) + self.config.drift_constant()
    }

    /// Validity left after `elapsed`, or `None` if nothing remains.
    fn validity(&self, ttl: Duration, elapsed: Duration) -> Option<Duration> {
        ttl.checked_sub(elapsed)
            .and_then(|left| left.checked_sub(self.drift(ttl)))
            .filter(|validity| !validity.is_zero())
    }

    /// Acquire `name` for `ttl`, retrying up to `max_retries` times after the
    /// first attempt with the configured backoff.
    pub async fn acquire(
        &self,
        ctx: &LockContext,
        name: &str,
        ttl: Duration,
        max_retries: u32,
    ) -> Result<LockHandle> {
        Self::check_request(name, ttl)?;

        let started = Instant::now();
        let key = self.key_for(name);
        let mut best = 0;
        let mut retries_done = 0;

        loop {
            match self.attempt(ctx, name, &key, ttl).await {
                Attempt::Held(handle) => {
                    info!(
                        lock = %name,
                        stores = handle.acquired_stores(),
                        validity_ms = handle.remaining().as_millis() as u64,
                        attempts = retries_done + 1,
                        "Lock acquired"
                    );
                    metrics::record_acquire("acquired", started.elapsed());
                    return Ok(handle);
                }
                Attempt::Failed(tally) => best = best.max(tally.succeeded),
                Attempt::Cancelled => {
                    metrics::record_acquire("cancelled", started.elapsed());
                    return Err(LockError::Cancelled {
                        name: name.to_string(),
                    });
                }
            }

            let Some(delay) = self.retry.next_delay(retries_done, max_retries) else {
                break;
            };
            retries_done += 1;
            debug!(lock = %name, retry = retries_done, delay_ms = delay.as_millis() as u64, "Retrying lock acquisition");

            tokio::select! {
                _ = ctx.done() => {
                    metrics::record_acquire("cancelled", started.elapsed());
                    return Err(LockError::Cancelled { name: name.to_string() });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(lock = %name, attempts = retries_done + 1, best, "Lock unavailable");
        metrics::record_acquire("unavailable", started.elapsed());
        Err(LockError::LockUnavailable {
            name: name.to_string(),
            attempts: retries_done + 1,
            acquired: best,
            quorum: self.quorum(),
        })
    }

    /// Single attempt, no retries.
    pub async fn try_acquire(
        &self,
        ctx: &LockContext,
        name: &str,
        ttl: Duration,
    ) -> Result<LockHandle> {
        self.acquire(ctx, name, ttl, 0).await
    }

    /// Acquire with the configured default TTL and retry count.
    pub async fn acquire_default(&self, ctx: &LockContext, name: &str) -> Result<LockHandle> {
        self.acquire(
            ctx,
            name,
            self.config.default_ttl(),
            self.config.max_retries,
        )
        .await
    }

    async fn attempt(&self, ctx: &LockContext, name: &str, key: &str, ttl: Duration) -> Attempt {
        let token = LockToken::generate();
        let t0 = Instant::now();
        let tally = self.pool.try_acquire_all(ctx, key, &token, ttl).await;
        let elapsed = t0.elapsed();

        if tally.cancelled {
            self.cleanup(key, &token, tally.succeeded).await;
            return Attempt::Cancelled;
        }

        match self.validity(ttl, elapsed) {
            Some(validity) if tally.reached(self.quorum()) => Attempt::Held(LockHandle::new(
                name.to_string(),
                key.to_string(),
                token,
                t0,
                t0 + validity,
                tally.succeeded,
            )),
            validity => {
                debug!(
                    lock = %name,
                    succeeded = tally.succeeded,
                    rejected = tally.rejected,
                    failed = tally.failed,
                    quorum = self.quorum(),
                    expired_in_flight = validity.is_none(),
                    "Lock attempt failed"
                );
                self.cleanup(key, &token, tally.succeeded).await;
                Attempt::Failed(tally)
            }
        }
    }

    /// Push the lock's expiry forward to `ttl` from now.
    ///
    /// `ttl` may not be shorter than the validity the handle still has, so a
    /// successful extension never moves the deadline back. If the stores no
    /// longer give a quorum the handle becomes `Lost` and `LockLost` is
    /// returned; exclusivity must no longer be assumed.
    pub async fn extend(
        &self,
        ctx: &LockContext,
        handle: &mut LockHandle,
        ttl: Duration,
    ) -> Result<()> {
        match handle.state() {
            LockState::Held => {}
            LockState::Lost => {
                return Err(LockError::LockLost {
                    name: handle.name().to_string(),
                });
            }
            state @ (LockState::Expired | LockState::Released) => {
                handle.mark(state);
                return Err(LockError::LockAlreadyReleased {
                    name: handle.name().to_string(),
                    state,
                });
            }
        }
        Self::check_request(handle.name(), ttl)?;
        let remaining = handle.remaining();
        if ttl < remaining {
            return Err(LockError::InvalidArgument(format!(
                "extension ttl {:?} is shorter than the remaining validity {:?}",
                ttl, remaining
            )));
        }

        let t0 = Instant::now();
        let tally = self
            .pool
            .extend_all(ctx, handle.key(), handle.token(), ttl)
            .await;
        let elapsed = t0.elapsed();

        if tally.cancelled {
            // Records are either untouched or pushed further out, so the
            // current deadline still holds.
            return Err(LockError::Cancelled {
                name: handle.name().to_string(),
            });
        }

        match self.validity(ttl, elapsed) {
            Some(validity) if tally.reached(self.quorum()) => {
                handle.extended(t0 + validity, tally.succeeded);
                debug!(
                    lock = %handle.name(),
                    stores = tally.succeeded,
                    extensions = handle.extensions(),
                    "Lock extended"
                );
                metrics::record_extend("extended");
                Ok(())
            }
            _ => {
                warn!(
                    lock = %handle.name(),
                    succeeded = tally.succeeded,
                    rejected = tally.rejected,
                    failed = tally.failed,
                    quorum = self.quorum(),
                    "Lock lost during extension"
                );
                handle.mark(LockState::Lost);
                self.cleanup(handle.key(), handle.token(), tally.succeeded)
                    .await;
                metrics::record_extend("lost");
                Err(LockError::LockLost {
                    name: handle.name().to_string(),
                })
            }
        }
    }

    /// Remove this handle's records from every store. Succeeds regardless of
    /// how many stores answered; returns the number of records removed.
    ///
    /// Releasing a handle twice is an error.
    pub async fn release(&self, ctx: &LockContext, handle: &mut LockHandle) -> Result<usize> {
        if handle.state() == LockState::Released {
            return Err(LockError::LockAlreadyReleased {
                name: handle.name().to_string(),
                state: LockState::Released,
            });
        }

        let removed = self
            .pool
            .release_all(ctx, handle.key(), handle.token())
            .await;
        handle.mark(LockState::Released);
        metrics::record_release();
        info!(lock = %handle.name(), removed, "Lock released");
        Ok(removed)
    }

    /// Release by identity, e.g. from a task other than the one holding the
    /// handle. Only records carrying the identity's token are removed.
    pub async fn release_identity(&self, ctx: &LockContext, identity: &LockIdentity) -> usize {
        let removed = self
            .pool
            .release_all(ctx, &identity.key, &identity.token)
            .await;
        metrics::record_release();
        info!(lock = %identity.name, removed, "Lock released by identity");
        removed
    }

    /// Local check that the handle is held and its deadline has not passed.
    /// Never contacts the stores.
    pub fn valid(&self, handle: &LockHandle) -> bool {
        handle.is_valid()
    }

    /// Ask every store whether it still carries the handle's token.
    /// True only if the handle is locally valid and a quorum still matches.
    pub async fn verify(&self, ctx: &LockContext, handle: &LockHandle) -> bool {
        if !handle.is_valid() {
            return false;
        }
        let matching = self
            .pool
            .count_matching(ctx, handle.key(), handle.token())
            .await;
        matching >= self.quorum()
    }

    /// Current value of `name` on every store, in pool order.
    pub async fn inspect(&self, ctx: &LockContext, name: &str) -> Vec<(String, Option<LockToken>)> {
        let values = self.pool.get_all(ctx, &self.key_for(name)).await;
        self.pool
            .members()
            .iter()
            .map(|member| member.conn.name().to_string())
            .zip(values)
            .collect()
    }

    pub async fn health(&self, ctx: &LockContext) -> Vec<StoreHealth> {
        self.pool.ping_all(ctx).await
    }

    /// Best-effort removal of records written by a failed attempt. `written`
    /// is how many stores acknowledged the write.
    async fn cleanup(&self, key: &str, token: &LockToken, written: usize) {
        // Detached so a cancelled caller still gets its partial writes removed.
        let removed = self.pool.release_all(&LockContext::new(), key, token).await;
        if removed < written {
            warn!(key = %key, written, removed, "Partial lock records left to expire");
        } else if removed > 0 {
            debug!(key = %key, removed, "Removed partial lock records");
        }
    }

    fn check_request(name: &str, ttl: Duration) -> Result<()> {
        if name.is_empty() {
            return Err(LockError::InvalidArgument(
                "lock name must not be empty".to_string(),
            ));
        }
        if ttl.is_zero() {
            return Err(LockError::InvalidArgument(
                "lock ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
