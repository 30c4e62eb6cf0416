use crate::config::AllocatorConfig;
use crate::error::{KeyError, Result};
use jiff::{SignedDuration, Timestamp};
use keyhole_core::{Key, UnusedKeys, UsedKeys};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Reserves keys for callers.
///
/// A reservation pops a candidate from the unused-key reservoir and claims
/// it in the used-key registry. An empty reservoir or a lost claim is
/// retried with a fresh candidate for as long as the caller is willing to
/// wait; any other failure ends the call. A candidate that fails to claim is
/// dropped, it never goes back into the reservoir.
#[derive(Debug)]
pub struct Allocator<U, N> {
    used: Arc<U>,
    unused: Arc<N>,
    ttl: Duration,
    retry_backoff: Duration,
    span: Span,
}

impl<U, N> Clone for Allocator<U, N> {
    fn clone(&self) -> Self {
        Self {
            used: Arc::clone(&self.used),
            unused: Arc::clone(&self.unused),
            ttl: self.ttl,
            retry_backoff: self.retry_backoff,
            span: self.span.clone(),
        }
    }
}

impl<U: UsedKeys, N: UnusedKeys> Allocator<U, N> {
    /// Creates an allocator logging under a `keygen.allocator` span.
    pub fn new(config: AllocatorConfig, used: Arc<U>, unused: Arc<N>) -> Self {
        Self::with_span(config, used, unused, info_span!("keygen.allocator"))
    }

    /// Creates an allocator whose logs are recorded under `span`.
    pub fn with_span(config: AllocatorConfig, used: Arc<U>, unused: Arc<N>, span: Span) -> Self {
        Self {
            used,
            unused,
            ttl: config.ttl,
            retry_backoff: config.retry_backoff,
            span,
        }
    }

    /// Reserves one key, retrying until it succeeds or `cancel` fires.
    ///
    /// # Returns
    ///
    /// * `Ok(key)` - A key that was just claimed, expiring `ttl` from now
    /// * `Err(KeyError::Cancelled)` - If `cancel` fired before a key was claimed
    /// * `Err(e)` - The first non-retryable repository failure
    pub async fn use_key(&self, cancel: &CancellationToken) -> Result<Key> {
        self.reserve_with_retry(cancel)
            .instrument(self.span.clone())
            .await
    }

    /// Like [`use_key`](Self::use_key), but gives up once `budget` has elapsed.
    pub async fn use_key_within(
        &self,
        cancel: &CancellationToken,
        budget: Duration,
    ) -> Result<Key> {
        match tokio::time::timeout(budget, self.use_key(cancel)).await {
            Ok(result) => result,
            Err(_) => {
                self.span
                    .in_scope(|| info!(budget = ?budget, "no key reserved before the deadline"));
                Err(KeyError::DeadlineExceeded(budget))
            }
        }
    }

    async fn reserve_with_retry(&self, cancel: &CancellationToken) -> Result<Key> {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            // Dropping an attempt between pop and claim abandons that one
            // candidate, which is the same outcome as a lost claim.
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(KeyError::Cancelled),
                outcome = self.reserve() => outcome,
            };

            match outcome {
                Ok(key) => {
                    debug!(key = %key, attempt, "reserved key");
                    return Ok(key);
                }
                Err(err) if err.is_retryable() => match err {
                    KeyError::AlreadyUsed(key) => {
                        info!(key = %key, attempt, "expected free key is already in use - retry");
                    }
                    _ => info!(attempt, "no free keys - retry"),
                },
                Err(err) => {
                    warn!(error = %err, attempt, "failed to reserve key");
                    return Err(err);
                }
            }

            self.back_off(cancel).await?;
        }
    }

    async fn reserve(&self) -> Result<Key> {
        let candidate = self.unused.pop().await?;

        let expires_at = expiry_after(self.ttl);
        if !self.used.claim(&candidate, self.ttl).await? {
            return Err(KeyError::AlreadyUsed(candidate));
        }

        Ok(Key::new(candidate, expires_at))
    }

    async fn back_off(&self, cancel: &CancellationToken) -> Result<()> {
        if self.retry_backoff.is_zero() {
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                return Err(KeyError::Cancelled);
            }
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(KeyError::Cancelled),
            _ = tokio::time::sleep(self.retry_backoff) => Ok(()),
        }
    }
}

/// `now + ttl`, saturating at the largest representable timestamp.
fn expiry_after(ttl: Duration) -> Timestamp {
    SignedDuration::try_from(ttl)
        .ok()
        .and_then(|ttl| Timestamp::now().checked_add(ttl).ok())
        .unwrap_or(Timestamp::MAX)
}
