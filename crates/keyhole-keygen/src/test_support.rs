//! Scripted repository doubles for allocator and replenisher tests.

use async_trait::async_trait;
use keyhole_core::error::Result;
use keyhole_core::{StorageError, UnusedKeys, UsedKeys};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

type Hook = Box<dyn Fn() + Send + Sync>;

/// Replays scripted `pop` outcomes; an exhausted script behaves like an empty reservoir.
#[derive(Default)]
pub(crate) struct ScriptedUnusedKeys {
    pops: Mutex<VecDeque<Result<String>>>,
    pop_calls: Mutex<usize>,
    on_pop: Option<Hook>,
}

impl ScriptedUnusedKeys {
    pub(crate) fn new(pops: impl IntoIterator<Item = Result<String>>) -> Self {
        Self {
            pops: Mutex::new(pops.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Runs `hook` at the start of every pop.
    pub(crate) fn on_pop(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_pop = Some(Box::new(hook));
        self
    }

    pub(crate) fn pop_calls(&self) -> usize {
        *self.pop_calls.lock()
    }
}

#[async_trait]
impl UnusedKeys for ScriptedUnusedKeys {
    async fn pop(&self) -> Result<String> {
        if let Some(hook) = &self.on_pop {
            hook();
        }
        *self.pop_calls.lock() += 1;
        self.pops
            .lock()
            .pop_front()
            .unwrap_or(Err(StorageError::NotFound))
    }

    async fn store(&self, _keys: &[String]) -> Result<u64> {
        Err(StorageError::Operation("store is not scripted".to_string()))
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.pops.lock().len() as u64)
    }
}

/// Replays scripted `claim` outcomes and records the claims it saw.
#[derive(Default)]
pub(crate) struct ScriptedUsedKeys {
    claims: Mutex<VecDeque<Result<bool>>>,
    seen: Mutex<Vec<(String, Duration)>>,
}

impl ScriptedUsedKeys {
    pub(crate) fn new(claims: impl IntoIterator<Item = Result<bool>>) -> Self {
        Self {
            claims: Mutex::new(claims.into_iter().collect()),
            ..Default::default()
        }
    }

    pub(crate) fn seen(&self) -> Vec<(String, Duration)> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl UsedKeys for ScriptedUsedKeys {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.seen.lock().push((key.to_string(), ttl));
        self.claims
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(StorageError::Operation(format!("unexpected claim of {key}"))))
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
}

/// An unused-key store whose every operation fails.
pub(crate) struct BrokenUnusedKeys;

#[async_trait]
impl UnusedKeys for BrokenUnusedKeys {
    async fn pop(&self) -> Result<String> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn store(&self, _keys: &[String]) -> Result<u64> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn size(&self) -> Result<u64> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }
}

type CheckHook = Box<dyn Fn(u64) + Send + Sync>;

/// A registry reporting the first `held` looked-up candidates as claimed.
pub(crate) struct HeldUsedKeys {
    held: u64,
    checks: Mutex<u64>,
    on_check: Option<CheckHook>,
}

impl HeldUsedKeys {
    pub(crate) fn new(held: u64) -> Self {
        Self {
            held,
            checks: Mutex::new(0),
            on_check: None,
        }
    }

    /// Runs `hook` with the running lookup count on every `exists`.
    pub(crate) fn on_check(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_check = Some(Box::new(hook));
        self
    }

    pub(crate) fn checks(&self) -> u64 {
        *self.checks.lock()
    }
}

#[async_trait]
impl UsedKeys for HeldUsedKeys {
    async fn claim(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn exists(&self, _key: &str) -> Result<bool> {
        let checks = {
            let mut checks = self.checks.lock();
            *checks += 1;
            *checks
        };
        if let Some(hook) = &self.on_check {
            hook(checks);
        }
        Ok(checks <= self.held)
    }
}

/// Collects formatted log lines for assertions.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    /// Installs a subscriber writing into this buffer for the current thread.
    pub(crate) fn install(&self) -> tracing::subscriber::DefaultGuard {
        let buffer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || buffer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
