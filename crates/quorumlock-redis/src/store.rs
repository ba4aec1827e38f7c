// Redis store connection
// SET NX PX for acquire, scripts for the compare-and-act operations.

use std::time::Duration;

use async_trait::async_trait;
use quorumlock_core::{LockContext, LockError, LockToken, StoreConn, StoreError};
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::script::{DELETE_IF_EQUALS_SCRIPT, SET_IF_ABSENT_OR_EQUAL_SCRIPT};

/// One standalone Redis server.
///
/// The connection is established on first use and re-established by the
/// connection manager after failures, so a server that is down at startup
/// only costs votes until it comes back.
pub struct RedisStore {
    name: String,
    client: Client,
    conn: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// Parse `url` without connecting.
    pub fn lazy(name: impl Into<String>, url: &str) -> Result<Self, LockError> {
        let name = name.into();
        let client = Client::open(url)
            .map_err(|e| LockError::Config(format!("invalid redis address for '{}': {}", name, e)))?;
        Ok(Self {
            name,
            client,
            conn: OnceCell::new(),
        })
    }

    /// Parse `url` and connect now.
    pub async fn connect(name: impl Into<String>, url: &str) -> Result<Self, LockError> {
        let store = Self::lazy(name, url)?;
        store.connection().await.map_err(|e| {
            LockError::Config(format!("failed to connect to '{}': {}", store.name, e))
        })?;
        Ok(store)
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let conn = self.client.get_connection_manager().await?;
                info!(store = %self.name, "Connected to redis");
                Ok::<_, RedisError>(conn)
            })
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(conn.clone())
    }

    fn store_error(&self, e: RedisError) -> StoreError {
        debug!(store = %self.name, error = %e, "Redis call failed");
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            StoreError::Unavailable(self.name.clone())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl StoreConn for RedisStore {
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
        let mut conn = self.connection().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(reply.is_some())
    }

    async fn set_if_absent_or_equal(
        &self,
        _ctx: &LockContext,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let written: i64 = SET_IF_ABSENT_OR_EQUAL_SCRIPT
            .key(key)
            .arg(token.as_str())
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(written == 1)
    }

    async fn delete_if_equals(
        &self,
        _ctx: &LockContext,
        key: &str,
        token: &LockToken,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let deleted: i64 = DELETE_IF_EQUALS_SCRIPT
            .key(key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(deleted == 1)
    }

    async fn get(&self, _ctx: &LockContext, key: &str) -> Result<Option<LockToken>, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(value.map(LockToken::from))
    }

    async fn ping(&self, _ctx: &LockContext) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.store_error(e))?;
        Ok(())
    }
}
