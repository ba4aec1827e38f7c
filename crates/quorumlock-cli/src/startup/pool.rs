//! Store pool construction from configuration
//!
//! `redis://` and `rediss://` addresses become `RedisStore`s, `memory://name`
//! an in-process `MemoryStore` (useful for trying the tool out).

use std::sync::Arc;

use quorumlock_core::{
    LockError, MemoryStore, PoolConfig, PoolMember, QuorumPool, StoreConfig, StoreConn,
};
use quorumlock_redis::{RedisStore, is_redis_address};
use tracing::info;

pub const MEMORY_SCHEME: &str = "memory://";

/// Store connection for one configured endpoint. Redis stores connect on
/// first use.
pub fn connect_store(store: &StoreConfig) -> Result<Arc<dyn StoreConn>, LockError> {
    let name = store.display_name().to_string();
    if let Some(memory_name) = store.address.strip_prefix(MEMORY_SCHEME) {
        let name = store.name.clone().unwrap_or_else(|| memory_name.to_string());
        return Ok(Arc::new(MemoryStore::new(name)));
    }
    if is_redis_address(&store.address) {
        return Ok(Arc::new(RedisStore::lazy(name, &store.address)?));
    }
    Err(LockError::Config(format!(
        "unsupported store address '{}'",
        store.address
    )))
}

pub fn build_pool(config: &PoolConfig) -> Result<QuorumPool, LockError> {
    config.validate()?;
    let members = config
        .stores
        .iter()
        .map(|store| Ok(PoolMember::new(connect_store(store)?, config.timeout_for(store))))
        .collect::<Result<Vec<_>, LockError>>()?;

    let pool = QuorumPool::new(members)?;
    info!(stores = pool.len(), quorum = pool.quorum(), "Store pool ready");
    Ok(pool)
}
