use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The reservoir of generated keys that have not been handed out yet.
///
/// Every operation must be atomic with respect to concurrent callers,
/// including callers in other processes sharing the same backend.
#[async_trait]
pub trait UnusedKeys: Send + Sync + 'static {
    /// Removes and returns an arbitrary key from the reservoir.
    ///
    /// Returns `Err(StorageError::NotFound)` if the reservoir is empty.
    async fn pop(&self) -> Result<String>;

    /// Adds the keys that are not already present.
    /// Returns how many keys were newly added.
    async fn store(&self, keys: &[String]) -> Result<u64>;

    /// Returns the number of keys currently in the reservoir.
    async fn size(&self) -> Result<u64>;
}

/// The registry of keys that are currently claimed.
#[async_trait]
pub trait UsedKeys: Send + Sync + 'static {
    /// Claims `key` for `ttl` if nobody holds it.
    /// Returns `false` if an unexpired claim already exists.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Checks whether `key` is currently claimed.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Removes claims whose TTL has lapsed and returns how many were dropped.
    ///
    /// Stores that expire entries on their own keep this default.
    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }
}

#[async_trait]
impl<T: UnusedKeys + ?Sized> UnusedKeys for Arc<T> {
    async fn pop(&self) -> Result<String> {
        (**self).pop().await
    }

    async fn store(&self, keys: &[String]) -> Result<u64> {
        (**self).store(keys).await
    }

    async fn size(&self) -> Result<u64> {
        (**self).size().await
    }
}

#[async_trait]
impl<T: UsedKeys + ?Sized> UsedKeys for Arc<T> {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        (**self).claim(key, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key).await
    }

    async fn purge_expired(&self) -> Result<u64> {
        (**self).purge_expired().await
    }
}
