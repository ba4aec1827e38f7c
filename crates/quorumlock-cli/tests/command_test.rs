// Integration tests for the CLI commands
// Commands run against in-memory stores on a paused clock

use std::sync::Arc;
use std::time::Duration;

use quorumlock_cli::command::run;
use quorumlock_cli::model::{AcquireArgs, Command};
use quorumlock_cli::startup::build_pool;
use quorumlock_core::{LockConfig, LockManager, PoolConfig, StoreConfig};
use tokio_util::sync::CancellationToken;

fn manager(stores: usize) -> Arc<LockManager> {
    let pool = PoolConfig {
        stores: (0..stores)
            .map(|i| StoreConfig {
                name: None,
                address: format!("memory://store-{}", i),
                timeout_ms: None,
            })
            .collect(),
        ..Default::default()
    };
    let config = LockConfig {
        key_prefix: "lock:".to_string(),
        ..Default::default()
    };
    Arc::new(LockManager::new(Arc::new(build_pool(&pool).unwrap()), config).unwrap())
}

fn acquire_args(name: &str, ttl_ms: u64) -> AcquireArgs {
    AcquireArgs {
        name: name.to_string(),
        ttl_ms: Some(ttl_ms),
        retries: Some(0),
        wait_ms: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_acquire_status_release() {
    let manager = manager(3);
    let shutdown = CancellationToken::new();

    let output = run(
        Command::Acquire(acquire_args("jobs", 10_000)),
        manager.clone(),
        shutdown.clone(),
    )
    .await
    .unwrap();
    assert!(output.success);
    assert_eq!(output.report["key"], "lock:jobs");
    assert_eq!(output.report["stores"], 3);
    assert_eq!(output.report["validity_ms"], 9898);
    let token = output.report["token"].as_str().unwrap().to_string();

    // Held: a second acquire fails
    assert!(
        run(
            Command::Acquire(acquire_args("jobs", 10_000)),
            manager.clone(),
            shutdown.clone(),
        )
        .await
        .is_err()
    );

    let output = run(
        Command::Status {
            name: "jobs".to_string(),
        },
        manager.clone(),
        shutdown.clone(),
    )
    .await
    .unwrap();
    assert_eq!(output.report["holder"], token.as_str());
    assert_eq!(output.report["agreeing"], 3);

    let output = run(
        Command::Release {
            name: "jobs".to_string(),
            token: "not-the-token".to_string(),
        },
        manager.clone(),
        shutdown.clone(),
    )
    .await
    .unwrap();
    assert!(!output.success);
    assert_eq!(output.report["removed"], 0);

    let output = run(
        Command::Release {
            name: "jobs".to_string(),
            token,
        },
        manager.clone(),
        shutdown.clone(),
    )
    .await
    .unwrap();
    assert!(output.success);
    assert_eq!(output.report["removed"], 3);

    let output = run(
        Command::Status {
            name: "jobs".to_string(),
        },
        manager,
        shutdown,
    )
    .await
    .unwrap();
    assert!(output.report["holder"].is_null());
}

#[tokio::test(start_paused = true)]
async fn test_hold_extends_and_releases() {
    let manager = manager(3);

    let output = run(
        Command::Hold {
            acquire: acquire_args("leader", 1_000),
            for_ms: 5_000,
        },
        manager.clone(),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert!(output.success);
    assert_eq!(output.report["held_ms"], 5000);
    assert_eq!(output.report["lost"], false);
    assert_eq!(output.report["interrupted"], false);
    assert_eq!(output.report["removed"], 3);
    assert!(output.report["extensions"].as_u64().unwrap() >= 10);
}

#[tokio::test(start_paused = true)]
async fn test_hold_interrupted_by_shutdown() {
    let manager = manager(3);
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        trigger.cancel();
    });

    let output = run(
        Command::Hold {
            acquire: acquire_args("leader", 1_000),
            for_ms: 60_000,
        },
        manager,
        shutdown,
    )
    .await
    .unwrap();
    assert!(output.success);
    assert_eq!(output.report["interrupted"], true);
    assert_eq!(output.report["held_ms"], 1500);
    assert_eq!(output.report["removed"], 3);
}

#[tokio::test(start_paused = true)]
async fn test_ping() {
    let output = run(Command::Ping, manager(5), CancellationToken::new())
        .await
        .unwrap();
    assert!(output.success);
    assert_eq!(output.report["healthy"], 5);
    assert_eq!(output.report["quorum"], 3);
}
