//! Quorumlock Redis - `StoreConn` over independent Redis servers
//!
//! Each `RedisStore` talks to one standalone Redis instance. A quorum pool is
//! built from several of them; they must not replicate to each other.

mod script;
mod store;

pub use store::RedisStore;

/// Address scheme served by this crate.
pub const REDIS_SCHEME: &str = "redis://";
/// TLS address scheme.
pub const REDIS_TLS_SCHEME: &str = "rediss://";

/// Whether `address` names a Redis endpoint.
pub fn is_redis_address(address: &str) -> bool {
    address.starts_with(REDIS_SCHEME) || address.starts_with(REDIS_TLS_SCHEME)
}
