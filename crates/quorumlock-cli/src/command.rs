//! Subcommand execution

use std::sync::Arc;
use std::time::Duration;

use quorumlock_core::{
    KeepAlive, LockContext, LockHandle, LockIdentity, LockManager, LockState, LockToken,
};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::{
    AcquireArgs, AcquireReport, Command, HoldReport, PingReport, ReleaseReport, StatusReport,
};

/// Report to print and whether the command achieved what it was asked to.
#[derive(Debug)]
pub struct Output {
    pub report: serde_json::Value,
    pub success: bool,
}

impl Output {
    fn new(report: impl Serialize, success: bool) -> anyhow::Result<Self> {
        Ok(Self {
            report: serde_json::to_value(report)?,
            success,
        })
    }
}

pub async fn run(
    command: Command,
    manager: Arc<LockManager>,
    shutdown: CancellationToken,
) -> anyhow::Result<Output> {
    match command {
        Command::Acquire(args) => acquire(&manager, &shutdown, &args).await,
        Command::Release { name, token } => release(&manager, &shutdown, name, token).await,
        Command::Hold { acquire, for_ms } => {
            hold(manager, &shutdown, &acquire, Duration::from_millis(for_ms)).await
        }
        Command::Status { name } => status(&manager, &shutdown, &name).await,
        Command::Ping => ping(&manager, &shutdown).await,
    }
}

fn context(shutdown: &CancellationToken, wait_ms: Option<u64>) -> LockContext {
    let ctx = LockContext::from_token(shutdown.child_token());
    match wait_ms {
        Some(wait) => ctx.with_timeout(Duration::from_millis(wait)),
        None => ctx,
    }
}

fn ttl_of(manager: &LockManager, args: &AcquireArgs) -> Duration {
    args.ttl_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| manager.config().default_ttl())
}

async fn acquire_handle(
    manager: &LockManager,
    shutdown: &CancellationToken,
    args: &AcquireArgs,
) -> anyhow::Result<LockHandle> {
    let ctx = context(shutdown, args.wait_ms);
    let retries = args.retries.unwrap_or(manager.config().max_retries);
    let handle = manager
        .acquire(&ctx, &args.name, ttl_of(manager, args), retries)
        .await?;
    Ok(handle)
}

async fn acquire(
    manager: &LockManager,
    shutdown: &CancellationToken,
    args: &AcquireArgs,
) -> anyhow::Result<Output> {
    let handle = acquire_handle(manager, shutdown, args).await?;
    Output::new(AcquireReport::new(&handle, manager.quorum()), true)
}

async fn release(
    manager: &LockManager,
    shutdown: &CancellationToken,
    name: String,
    token: String,
) -> anyhow::Result<Output> {
    let identity = LockIdentity {
        key: manager.key_for(&name),
        name,
        token: LockToken::from(token),
    };
    let removed = manager
        .release_identity(&context(shutdown, None), &identity)
        .await;
    if removed == 0 {
        warn!(lock = %identity.name, "No store held this token");
    }
    Output::new(
        ReleaseReport {
            name: identity.name,
            removed,
        },
        removed > 0,
    )
}

/// Acquire, keep alive until `duration` passes, the lock is lost or the
/// process is asked to stop, then release.
async fn hold(
    manager: Arc<LockManager>,
    shutdown: &CancellationToken,
    args: &AcquireArgs,
    duration: Duration,
) -> anyhow::Result<Output> {
    let ttl = ttl_of(&manager, args);
    let handle = acquire_handle(&manager, shutdown, args).await?;
    let started = Instant::now();
    info!(lock = %handle.name(), hold_ms = duration.as_millis() as u64, "Holding lock");

    let mut keepalive = KeepAlive::spawn(manager.clone(), handle, ttl);
    let mut interrupted = false;
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.cancelled() => interrupted = true,
        _ = keepalive.lost() => {}
    }
    let held_ms = started.elapsed().as_millis() as u64;

    let mut handle = keepalive.stop().await?;
    let lost = handle.state() == LockState::Lost;
    // Detached from the shutdown token so an interrupted hold still releases
    let removed = manager.release(&LockContext::new(), &mut handle).await?;

    Output::new(
        HoldReport {
            name: handle.name().to_string(),
            token: handle.token().clone(),
            held_ms,
            extensions: handle.extensions(),
            lost,
            interrupted,
            removed,
        },
        !lost,
    )
}

async fn status(
    manager: &LockManager,
    shutdown: &CancellationToken,
    name: &str,
) -> anyhow::Result<Output> {
    let values = manager.inspect(&context(shutdown, None), name).await;
    Output::new(StatusReport::new(name, values, manager.quorum()), true)
}

async fn ping(manager: &LockManager, shutdown: &CancellationToken) -> anyhow::Result<Output> {
    let health = manager.health(&context(shutdown, None)).await;
    let report = PingReport::new(health, manager.quorum());
    let available = report.available;
    Output::new(report, available)
}
