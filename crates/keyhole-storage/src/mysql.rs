use crate::error::{is_unique_violation, map_sqlx_error};
use crate::{Result, StorageError, UsedKeys};
use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use sqlx::MySqlPool;
use std::time::Duration;
use tracing::trace;

/// Rows deleted per statement when purging lapsed claims.
const PURGE_BATCH: u64 = 1000;
/// Upper bound on statements issued by a single purge; the rest waits for the next one.
const PURGE_MAX_BATCHES: u32 = 100;

/// DDL for the `used_keys` table.
pub const USED_KEYS_DDL: &str = include_str!("../ddl/mysql/used_keys.sql");

/// MySQL implementation of the used-key registry.
///
/// Each claim is one row keyed by the key value, with its expiry stored as
/// unix milliseconds. Expired rows are treated as absent and are replaced by
/// the next claim on the same key; the primary key is what makes two
/// concurrent claims resolve to a single winner.
#[derive(Debug, Clone)]
pub struct MySqlUsedKeys {
    pool: MySqlPool,
}

impl MySqlUsedKeys {
    /// Creates a registry from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a registry by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `used_keys` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(USED_KEYS_DDL)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn expiry_millis(now: Timestamp, ttl: Duration) -> Result<i64> {
    SignedDuration::try_from(ttl)
        .ok()
        .and_then(|ttl| now.checked_add(ttl).ok())
        .map(|expire_at| expire_at.as_millisecond())
        .ok_or_else(|| StorageError::InvalidData(format!("ttl out of range: {ttl:?}")))
}

#[async_trait]
impl UsedKeys for MySqlUsedKeys {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Timestamp::now();
        let expire_at = expiry_millis(now, ttl)?;

        // Free the slot if the previous claim has lapsed. Losing a race here
        // is harmless: the insert below is what decides the winner.
        sqlx::query(
            r#"
            DELETE FROM used_keys
            WHERE k = ?
              AND expire_at <= ?
            "#,
        )
        .bind(key)
        .bind(now.as_millisecond())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let result = sqlx::query(
            r#"
            INSERT INTO used_keys (k, expire_at)
            VALUES (?, ?)
            "#,
        )
        .bind(key)
        .bind(expire_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => {
                trace!(key = %key, "Key is already claimed in MySQL");
                Ok(false)
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let exists = sqlx::query(
            r#"
            SELECT 1
            FROM used_keys
            WHERE k = ?
              AND expire_at > ?
            LIMIT 1
            "#,
        )
        .bind(key)
        .bind(Timestamp::now().as_millisecond())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .is_some();

        Ok(exists)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Timestamp::now().as_millisecond();
        let mut purged = 0;

        // Each statement deletes at most PURGE_BATCH rows.
        for _ in 0..PURGE_MAX_BATCHES {
            let deleted = sqlx::query(
                r#"
                DELETE FROM used_keys
                WHERE expire_at <= ?
                LIMIT ?
                "#,
            )
            .bind(now)
            .bind(PURGE_BATCH)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

            purged += deleted;
            if deleted < PURGE_BATCH {
                break;
            }
        }

        trace!(purged, "Purged lapsed claims from MySQL");
        Ok(purged)
    }
}
