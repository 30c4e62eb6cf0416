use crate::config::GeneratorConfig;
use crate::error::{KeyError, Result};
use keyhole_core::{UnusedKeys, UsedKeys};
use keyhole_generator::{Generator, RandomGenerator};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Consecutive discards for one slot after which a stall is reported.
pub const STALL_WARN_DISCARDS: u64 = 1000;

/// Number of keys added by one tick for a reservoir targeting `target` keys.
pub fn batch_size(target: u64) -> u64 {
    target / 10 + 1
}

/// Outcome of a single replenishment tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Reservoir size observed at the start of the tick.
    pub size_before: u64,
    /// Keys the tick set out to add. Zero when the tick was skipped.
    pub requested: u64,
    pub added: u64,
    /// Candidates dropped because they were claimed in the registry.
    pub discarded_used: u64,
    /// Candidates dropped because the reservoir already held them.
    pub discarded_pooled: u64,
}

impl TickReport {
    /// Whether the reservoir was above target and nothing was attempted.
    pub fn skipped(&self) -> bool {
        self.requested == 0
    }
}

/// Keeps the unused-key reservoir topped up.
///
/// Each tick compares the reservoir size against the configured target and,
/// unless it is already above it, adds a batch of fresh candidates. A
/// candidate is only stored when the registry does not hold a live claim on
/// it; one the reservoir already contains is not counted and another one is
/// drawn in its place.
pub struct Replenisher<U, N, G> {
    config: GeneratorConfig,
    used: Arc<U>,
    unused: Arc<N>,
    generator: G,
    span: Span,
}

impl<U, N, G> Replenisher<U, N, G>
where
    U: UsedKeys,
    N: UnusedKeys,
    G: Generator,
{
    pub fn new(config: GeneratorConfig, used: Arc<U>, unused: Arc<N>, generator: G) -> Self {
        Self::with_span(config, used, unused, generator, info_span!("keygen.replenisher"))
    }

    pub fn with_span(
        config: GeneratorConfig,
        used: Arc<U>,
        unused: Arc<N>,
        generator: G,
        span: Span,
    ) -> Self {
        Self {
            config,
            used,
            unused,
            generator,
            span,
        }
    }

    /// Runs one replenishment round.
    ///
    /// Any repository or generator failure aborts the round; keys stored
    /// before the failure stay in the reservoir.
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<TickReport> {
        self.fill(cancel).instrument(self.span.clone()).await
    }

    async fn fill(&self, cancel: &CancellationToken) -> Result<TickReport> {
        let target = self.config.predefined_keys_count;
        let size_before = self.unused.size().await?;

        let mut report = TickReport {
            size_before,
            ..Default::default()
        };
        if size_before > target {
            debug!(size = size_before, target, "reservoir above target - skip");
            return Ok(report);
        }

        report.requested = batch_size(target);
        for _ in 0..report.requested {
            self.fill_slot(cancel, &mut report).await?;
            report.added += 1;
        }

        Ok(report)
    }

    async fn fill_slot(&self, cancel: &CancellationToken, report: &mut TickReport) -> Result<()> {
        let mut discards: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(KeyError::Cancelled);
            }

            let candidate = self.generator.generate()?;

            if self.used.exists(&candidate).await? {
                report.discarded_used += 1;
            } else if self.unused.store(std::slice::from_ref(&candidate)).await? == 0 {
                report.discarded_pooled += 1;
            } else {
                return Ok(());
            }

            discards += 1;
            if discards % STALL_WARN_DISCARDS == 0 {
                warn!(discards, "no fresh candidate found for reservoir slot");
            }
            tokio::task::yield_now().await;
        }
    }

    /// Ticks every `delay` until `cancel` fires.
    ///
    /// The first tick happens one `delay` after the call. Ticks missed while
    /// a slow round was running are skipped, not replayed. After every round
    /// the registry is asked to drop lapsed claims.
    pub async fn run(self, cancel: CancellationToken) {
        let span = self.span.clone();
        self.run_loop(cancel).instrument(span).await
    }

    async fn run_loop(self, cancel: CancellationToken) {
        let period = self.config.delay.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            target = self.config.predefined_keys_count,
            delay = ?self.config.delay,
            "replenisher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.fill(&cancel).await {
                Ok(report) if report.skipped() => {}
                Ok(report) => debug!(
                    size_before = report.size_before,
                    added = report.added,
                    discarded_used = report.discarded_used,
                    discarded_pooled = report.discarded_pooled,
                    "replenished reservoir"
                ),
                Err(KeyError::Cancelled) => break,
                Err(err) => error!(error = %err, "replenishment failed"),
            }

            match self.used.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "purged lapsed claims"),
                Err(err) => warn!(error = %err, "failed to purge lapsed claims"),
            }
        }

        info!("replenisher stopped");
    }
}

/// Runs the replenisher with random keys of `config.key_len` characters
/// until `cancel` fires.
pub async fn generate<U: UsedKeys, N: UnusedKeys>(
    cancel: CancellationToken,
    config: GeneratorConfig,
    used: Arc<U>,
    unused: Arc<N>,
) {
    let generator = match RandomGenerator::new(config.key_len.into()) {
        Ok(generator) => generator,
        Err(err) => {
            error!(error = %err, "cannot start replenisher");
            return;
        }
    };

    Replenisher::new(config, used, unused, generator)
        .run(cancel)
        .await
}

/// Spawns [`generate`] onto the current runtime.
pub fn spawn_replenisher<U: UsedKeys, N: UnusedKeys>(
    cancel: CancellationToken,
    config: GeneratorConfig,
    used: Arc<U>,
    unused: Arc<N>,
) -> JoinHandle<()> {
    tokio::spawn(generate(cancel, config, used, unused))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{BrokenUnusedKeys, HeldUsedKeys, LogBuffer};
    use keyhole_core::{GeneratorError, StorageError};
    use keyhole_generator::SeqGenerator;
    use keyhole_storage::{InMemoryUnusedKeys, InMemoryUsedKeys};

    const HOUR: Duration = Duration::from_secs(3600);

    fn config(target: u64) -> GeneratorConfig {
        GeneratorConfig::builder()
            .predefined_keys_count(target)
            .delay(Duration::from_secs(1))
            .build()
    }

    struct FailingGenerator;

    impl Generator for FailingGenerator {
        fn generate(&self) -> std::result::Result<String, GeneratorError> {
            Err(GeneratorError::Entropy("no entropy".to_string()))
        }
    }

    #[test]
    fn batch_is_a_tenth_plus_one() {
        assert_eq!(batch_size(0), 1);
        assert_eq!(batch_size(9), 1);
        assert_eq!(batch_size(25), 3);
        assert_eq!(batch_size(100), 11);
    }

    #[tokio::test]
    async fn fills_until_above_target() {
        let unused = Arc::new(InMemoryUnusedKeys::new());
        let replenisher = Replenisher::new(
            config(25),
            Arc::new(InMemoryUsedKeys::new()),
            unused.clone(),
            RandomGenerator::new(10).unwrap(),
        );
        let cancel = CancellationToken::new();

        for _ in 0..8 {
            replenisher.tick(&cancel).await.unwrap();
        }
        assert_eq!(unused.size().await.unwrap(), 24);

        let report = replenisher.tick(&cancel).await.unwrap();
        assert_eq!(report.size_before, 24);
        assert_eq!(report.added, 3);
        assert_eq!(unused.size().await.unwrap(), 27);

        let report = replenisher.tick(&cancel).await.unwrap();
        assert!(report.skipped());
        assert_eq!(report.size_before, 27);
        assert_eq!(unused.size().await.unwrap(), 27);
    }

    #[tokio::test]
    async fn claimed_and_pooled_candidates_are_discarded() {
        let used = Arc::new(InMemoryUsedKeys::new());
        used.claim("k000000", HOUR).await.unwrap();
        used.claim("k000001", HOUR).await.unwrap();
        let unused = Arc::new(InMemoryUnusedKeys::with_keys(["k000002"]));
        let replenisher = Replenisher::new(
            config(20),
            used,
            unused.clone(),
            SeqGenerator::with_prefix("k"),
        );

        let report = replenisher.tick(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            report,
            TickReport {
                size_before: 1,
                requested: 3,
                added: 3,
                discarded_used: 2,
                discarded_pooled: 1,
            }
        );
        assert!(!unused.contains("k000000"));
        assert!(!unused.contains("k000001"));
        for key in ["k000002", "k000003", "k000004", "k000005"] {
            assert!(unused.contains(key), "{key} should be pooled");
        }
    }

    #[tokio::test]
    async fn size_failure_aborts_tick() {
        let replenisher = Replenisher::new(
            config(10),
            Arc::new(InMemoryUsedKeys::new()),
            Arc::new(BrokenUnusedKeys),
            SeqGenerator::with_prefix("k"),
        );

        let err = replenisher.tick(&CancellationToken::new()).await.unwrap_err();

        assert_eq!(
            err,
            KeyError::Storage(StorageError::Unavailable("connection refused".to_string()))
        );
    }

    #[tokio::test]
    async fn generator_failure_aborts_tick() {
        let unused = Arc::new(InMemoryUnusedKeys::new());
        let replenisher = Replenisher::new(
            config(10),
            Arc::new(InMemoryUsedKeys::new()),
            unused.clone(),
            FailingGenerator,
        );

        let err = replenisher.tick(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, KeyError::Generator(GeneratorError::Entropy(_))));
        assert_eq!(unused.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cancelled_tick_stops_before_generating() {
        let unused = Arc::new(InMemoryUnusedKeys::new());
        let replenisher = Replenisher::new(
            config(10),
            Arc::new(InMemoryUsedKeys::new()),
            unused.clone(),
            SeqGenerator::with_prefix("k"),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(replenisher.tick(&cancel).await.unwrap_err(), KeyError::Cancelled);
        assert_eq!(unused.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stalled_slot_observes_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let used = Arc::new(HeldUsedKeys::new(u64::MAX).on_check(move |checks| {
            if checks == 2_500 {
                trigger.cancel();
            }
        }));
        let unused = Arc::new(InMemoryUnusedKeys::new());
        let replenisher = Replenisher::new(
            config(10),
            used.clone(),
            unused.clone(),
            SeqGenerator::with_prefix("k"),
        );

        assert_eq!(replenisher.tick(&cancel).await.unwrap_err(), KeyError::Cancelled);
        assert_eq!(used.checks(), 2_500);
        assert_eq!(unused.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stalled_slot_warns_every_thousand_discards() {
        let logs = LogBuffer::default();
        let _guard = logs.install();
        let used = Arc::new(HeldUsedKeys::new(2_500));
        let unused = Arc::new(InMemoryUnusedKeys::new());
        let replenisher = Replenisher::new(
            config(5),
            used,
            unused.clone(),
            SeqGenerator::with_prefix("k"),
        );

        let report = replenisher.tick(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.added, 1);
        assert_eq!(report.discarded_used, 2_500);
        assert!(unused.contains("k002500"));
        let warnings = logs
            .contents()
            .matches("no fresh candidate found for reservoir slot")
            .count();
        assert_eq!(warnings, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_purges_lapsed_claims_after_each_round() {
        let used = Arc::new(InMemoryUsedKeys::new());
        used.claim("lapsed", Duration::ZERO).await.unwrap();
        used.claim("live", HOUR).await.unwrap();
        let cancel = CancellationToken::new();
        let handle = spawn_replenisher(
            cancel.clone(),
            config(5),
            used.clone(),
            Arc::new(InMemoryUnusedKeys::new()),
        );

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(used.len(), 1);
        assert!(used.exists("live").await.unwrap());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_on_interval_until_cancelled() {
        let unused = Arc::new(InMemoryUnusedKeys::new());
        let cancel = CancellationToken::new();
        let handle = spawn_replenisher(
            cancel.clone(),
            config(25),
            Arc::new(InMemoryUsedKeys::new()),
            unused.clone(),
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(unused.size().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(unused.size().await.unwrap(), 27);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(unused.size().await.unwrap(), 27);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("replenisher should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_key_length_never_starts() {
        let unused = Arc::new(InMemoryUnusedKeys::new());
        let config = GeneratorConfig::builder()
            .predefined_keys_count(5)
            .delay(Duration::from_millis(1))
            .key_len(0)
            .build();

        generate(
            CancellationToken::new(),
            config,
            Arc::new(InMemoryUsedKeys::new()),
            unused.clone(),
        )
        .await;

        assert_eq!(unused.size().await.unwrap(), 0);
    }
}
