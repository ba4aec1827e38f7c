//! Background extension of a held lock
//!
//! Extends every `ttl / 3` until stopped or until the lock is lost. The
//! handle moves into the task and is returned by `stop()`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::LockContext;
use crate::error::{LockError, Result};
use crate::handle::LockHandle;
use crate::manager::LockManager;

/// Extend at 1/3 of the TTL
const RENEW_DIVISOR: u32 = 3;

pub struct KeepAlive {
    name: String,
    stop: CancellationToken,
    lost_rx: watch::Receiver<bool>,
    task: Option<JoinHandle<LockHandle>>,
}

impl KeepAlive {
    /// A `ttl` shorter than the validity the handle has left is raised to it,
    /// since an extension may never move the deadline back.
    pub fn spawn(manager: Arc<LockManager>, handle: LockHandle, ttl: Duration) -> Self {
        let name = handle.name().to_string();
        let ttl = ttl.max(handle.remaining());
        let stop = CancellationToken::new();
        let (lost_tx, lost_rx) = watch::channel(false);
        let period = (ttl / RENEW_DIVISOR).max(Duration::from_millis(1));

        let task = tokio::spawn(Self::run(manager, handle, ttl, period, stop.clone(), lost_tx));

        Self {
            name,
            stop,
            lost_rx,
            task: Some(task),
        }
    }

    async fn run(
        manager: Arc<LockManager>,
        mut handle: LockHandle,
        ttl: Duration,
        period: Duration,
        stop: CancellationToken,
        lost_tx: watch::Sender<bool>,
    ) -> LockHandle {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let ctx = LockContext::from_token(stop.child_token());
                    match manager.extend(&ctx, &mut handle, ttl).await {
                        Ok(()) => {}
                        Err(LockError::Cancelled { .. }) => break,
                        Err(
                            e @ (LockError::LockLost { .. }
                            | LockError::LockAlreadyReleased { .. }),
                        ) => {
                            warn!(lock = %handle.name(), error = %e, "Keep-alive stopped, lock no longer held");
                            let _ = lost_tx.send(true);
                            break;
                        }
                        Err(e) => {
                            warn!(
                                lock = %handle.name(),
                                state = %handle.state(),
                                error = %e,
                                "Keep-alive stopped, extension refused"
                            );
                            break;
                        }
                    }
                }
            }
        }

        debug!(lock = %handle.name(), extensions = handle.extensions(), "Keep-alive finished");
        handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once an extension found the lock lost or no longer held.
    pub fn is_lost(&self) -> bool {
        *self.lost_rx.borrow()
    }

    /// Resolves with `true` when the lock is lost, or `false` if the task
    /// ended without losing it.
    pub async fn lost(&mut self) -> bool {
        self.lost_rx.wait_for(|lost| *lost).await.is_ok()
    }

    /// Stop extending and hand the lock back. The handle is still held unless
    /// an extension failed in the meantime.
    pub async fn stop(mut self) -> Result<LockHandle> {
        self.stop.cancel();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| LockError::Internal(format!("keep-alive task for '{}': {}", self.name, e))),
            None => Err(LockError::Internal(format!(
                "keep-alive task for '{}' already stopped",
                self.name
            ))),
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
