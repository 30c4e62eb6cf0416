use crate::{Result, StorageError, UnusedKeys, UsedKeys};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::{SignedDuration, Timestamp};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Claims between two sweeps of expired entries.
const SWEEP_EVERY_CLAIMS: u64 = 1024;

fn is_expired(expire_at: Timestamp) -> bool {
    Timestamp::now() >= expire_at
}

fn expiry_after(ttl: Duration) -> Result<Timestamp> {
    SignedDuration::try_from(ttl)
        .ok()
        .and_then(|ttl| Timestamp::now().checked_add(ttl).ok())
        .ok_or_else(|| StorageError::InvalidData(format!("ttl out of range: {ttl:?}")))
}

/// In-memory registry of claimed keys using DashMap.
///
/// An expired claim is dropped the first time it is looked at, and the whole
/// map is swept every [`SWEEP_EVERY_CLAIMS`] claims so that keys nobody asks
/// about again do not pile up. Claiming goes through the map's entry API, so
/// the check and the insert happen under the same shard lock.
#[derive(Debug, Default)]
pub struct InMemoryUsedKeys {
    storage: DashMap<String, Timestamp>,
    claims: AtomicU64,
}

impl InMemoryUsedKeys {
    /// Creates a new in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    fn sweep(&self) -> u64 {
        let mut purged = 0;
        self.storage.retain(|_, expire_at| {
            let keep = !is_expired(*expire_at);
            if !keep {
                purged += 1;
            }
            keep
        });
        purged
    }

    /// Returns the recorded expiry of `key`, expired or not.
    pub fn expiry_of(&self, key: &str) -> Option<Timestamp> {
        self.storage.get(key).map(|entry| *entry)
    }
}

#[async_trait]
impl UsedKeys for InMemoryUsedKeys {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        let expire_at = expiry_after(ttl)?;

        if (self.claims.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_EVERY_CLAIMS == 0 {
            self.sweep();
        }

        match self.storage.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                if !is_expired(*entry.get()) {
                    return Ok(false);
                }
                entry.insert(expire_at);
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(expire_at);
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        if self
            .storage
            .remove_if(key, |_, expire_at| is_expired(*expire_at))
            .is_some()
        {
            return Ok(false);
        }
        Ok(self.storage.contains_key(key))
    }

    async fn purge_expired(&self) -> Result<u64> {
        Ok(self.sweep())
    }
}

/// In-memory reservoir of unused keys.
///
/// A single mutex guards the set, which makes pop a real remove-and-return.
#[derive(Debug, Default)]
pub struct InMemoryUnusedKeys {
    keys: Mutex<HashSet<String>>,
}

impl InMemoryUnusedKeys {
    /// Creates an empty reservoir.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reservoir pre-seeded with `keys`.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: Mutex::new(keys.into_iter().map(Into::into).collect()),
        }
    }

    /// Checks whether `key` is currently in the reservoir.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.lock().contains(key)
    }
}

#[async_trait]
impl UnusedKeys for InMemoryUnusedKeys {
    async fn pop(&self) -> Result<String> {
        let mut keys = self.keys.lock();
        let key = keys.iter().next().cloned().ok_or(StorageError::NotFound)?;
        keys.remove(&key);
        Ok(key)
    }

    async fn store(&self, keys: &[String]) -> Result<u64> {
        let mut set = self.keys.lock();
        let added = keys.iter().filter(|key| set.insert((*key).clone())).count();
        Ok(added as u64)
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.keys.lock().len() as u64)
    }
}
