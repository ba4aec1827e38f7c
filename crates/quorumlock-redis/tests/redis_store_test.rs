// Integration tests against live Redis servers
// Set QUORUMLOCK_REDIS_URLS to a comma-separated list of independent servers
// and run with `--ignored`.

use std::sync::Arc;
use std::time::Duration;

use quorumlock_core::{LockConfig, LockContext, LockManager, LockToken, QuorumPool, StoreConn};
use quorumlock_redis::RedisStore;

const URLS_ENV: &str = "QUORUMLOCK_REDIS_URLS";

async fn redis_stores() -> Vec<Arc<dyn StoreConn>> {
    let urls = std::env::var(URLS_ENV).unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());
    let mut stores: Vec<Arc<dyn StoreConn>> = Vec::new();
    for (i, url) in urls.split(',').map(str::trim).filter(|u| !u.is_empty()).enumerate() {
        let store = RedisStore::connect(format!("redis-{}", i), url)
            .await
            .unwrap();
        stores.push(Arc::new(store));
    }
    stores
}

fn unique_key(prefix: &str) -> String {
    format!("quorumlock-test:{}:{}", prefix, LockToken::generate())
}

#[tokio::test]
#[ignore = "requires redis, set QUORUMLOCK_REDIS_URLS"]
async fn test_store_primitives() {
    let stores = redis_stores().await;
    let store = &stores[0];
    let ctx = LockContext::new();
    let key = unique_key("primitives");
    let mine = LockToken::generate();
    let other = LockToken::generate();
    let ttl = Duration::from_secs(5);

    assert!(store.ping(&ctx).await.is_ok());
    assert!(store.set_if_absent(&ctx, &key, &mine, ttl).await.unwrap());
    assert!(!store.set_if_absent(&ctx, &key, &other, ttl).await.unwrap());
    assert_eq!(store.get(&ctx, &key).await.unwrap(), Some(mine.clone()));

    assert!(store.set_if_absent_or_equal(&ctx, &key, &mine, ttl).await.unwrap());
    assert!(!store.set_if_absent_or_equal(&ctx, &key, &other, ttl).await.unwrap());

    assert!(!store.delete_if_equals(&ctx, &key, &other).await.unwrap());
    assert!(store.delete_if_equals(&ctx, &key, &mine).await.unwrap());
    assert_eq!(store.get(&ctx, &key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires redis, set QUORUMLOCK_REDIS_URLS"]
async fn test_record_expires() {
    let stores = redis_stores().await;
    let store = &stores[0];
    let ctx = LockContext::new();
    let key = unique_key("expiry");

    assert!(
        store
            .set_if_absent(&ctx, &key, &LockToken::generate(), Duration::from_millis(100))
            .await
            .unwrap()
    );
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(store.get(&ctx, &key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires redis, set QUORUMLOCK_REDIS_URLS"]
async fn test_lock_cycle() {
    let pool = Arc::new(QuorumPool::from_stores(redis_stores().await, Duration::from_millis(200)).unwrap());
    let manager = LockManager::new(pool, LockConfig::default()).unwrap();
    let ctx = LockContext::new();
    let name = unique_key("cycle");
    let ttl = Duration::from_secs(5);

    let mut handle = manager.try_acquire(&ctx, &name, ttl).await.unwrap();
    assert!(manager.verify(&ctx, &handle).await);
    assert!(manager.try_acquire(&ctx, &name, ttl).await.is_err());

    manager.extend(&ctx, &mut handle, ttl).await.unwrap();
    manager.release(&ctx, &mut handle).await.unwrap();

    let mut next = manager.try_acquire(&ctx, &name, ttl).await.unwrap();
    manager.release(&ctx, &mut next).await.unwrap();
}
