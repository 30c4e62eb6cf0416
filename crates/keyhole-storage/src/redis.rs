use crate::error::map_redis_error;
use crate::{Result, StorageError, UnusedKeys, UsedKeys};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Name of the Redis set holding unused keys.
pub const DEFAULT_UNUSED_SET: &str = "set_unusedkeys";

/// A Redis set used as the unused-key reservoir.
///
/// `SPOP`, `SADD` and `SCARD` are atomic on the server, so any number of
/// processes can share the same set.
#[derive(Debug, Clone)]
pub struct RedisUnusedKeys {
    conn: redis::aio::MultiplexedConnection,
    set_name: String,
}

impl RedisUnusedKeys {
    /// Creates a reservoir backed by [`DEFAULT_UNUSED_SET`].
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_set_name(conn, DEFAULT_UNUSED_SET)
    }

    /// Creates a reservoir backed by a custom set name.
    pub fn with_set_name(
        conn: redis::aio::MultiplexedConnection,
        set_name: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            set_name: set_name.into(),
        }
    }
}

#[async_trait]
impl UnusedKeys for RedisUnusedKeys {
    async fn pop(&self) -> Result<String> {
        let mut conn = self.conn.clone();
        match conn.spop::<_, Option<String>>(&self.set_name).await {
            Ok(Some(key)) => {
                trace!(key = %key, "Popped unused key from Redis");
                Ok(key)
            }
            Ok(None) => Err(StorageError::NotFound),
            Err(e) => {
                warn!(error = %e, "Redis error on spop");
                Err(map_redis_error("failed to pop unused key", e))
            }
        }
    }

    async fn store(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let added = conn
            .sadd::<_, _, u64>(&self.set_name, keys.to_vec())
            .await
            .map_err(|e| map_redis_error("failed to store unused keys", e))?;

        debug!(requested = keys.len(), added, "Stored unused keys in Redis");
        Ok(added)
    }

    async fn size(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        conn.scard::<_, u64>(&self.set_name)
            .await
            .map_err(|e| map_redis_error("failed to count unused keys", e))
    }
}

/// Redis string keys used as the registry of claimed keys.
///
/// A claim is `SET <prefix><key> "" NX PX <ttl>`; Redis drops the entry
/// itself once the TTL lapses.
#[derive(Debug, Clone)]
pub struct RedisUsedKeys {
    conn: redis::aio::MultiplexedConnection,
    key_prefix: String,
}

impl RedisUsedKeys {
    /// Creates a registry that stores claims under the bare key.
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_prefix(conn, "")
    }

    /// Creates a registry with a custom key prefix (e.g., "keyhole:used:").
    pub fn with_prefix(
        conn: redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

/// Redis rejects a zero expiry, so round up to the smallest one it accepts.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl UsedKeys for RedisUsedKeys {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&redis_key)
            .arg("")
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("failed to claim key", e))?;

        let claimed = reply.is_some();
        trace!(key = %key, claimed, "Claim attempted in Redis");
        Ok(claimed)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists::<_, bool>(self.redis_key(key))
            .await
            .map_err(|e| map_redis_error("failed to check used key", e))
    }
}
