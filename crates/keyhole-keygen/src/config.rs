use std::time::Duration;
use typed_builder::TypedBuilder;

/// Drives the background replenisher.
#[derive(Debug, Clone, TypedBuilder)]
pub struct GeneratorConfig {
    /// How many unused keys the reservoir should hold.
    #[builder(default = 100)]
    pub predefined_keys_count: u64,
    /// Time between two replenishment ticks.
    #[builder(default = Duration::from_secs(60))]
    pub delay: Duration,
    /// Length of generated keys.
    #[builder(default = 10)]
    pub key_len: u8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Drives the request-facing allocator.
#[derive(Debug, Clone, TypedBuilder)]
pub struct AllocatorConfig {
    /// How long a claimed key stays in use.
    #[builder(default = Duration::from_secs(24 * 60 * 60))]
    pub ttl: Duration,
    /// Pause between two reservation attempts. Zero only yields.
    #[builder(default = Duration::from_millis(10))]
    pub retry_backoff: Duration,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let generator = GeneratorConfig::default();
        assert_eq!(generator.predefined_keys_count, 100);
        assert_eq!(generator.delay, Duration::from_secs(60));
        assert_eq!(generator.key_len, 10);

        let allocator = AllocatorConfig::default();
        assert_eq!(allocator.ttl, Duration::from_secs(86_400));
        assert_eq!(allocator.retry_backoff, Duration::from_millis(10));
    }
}
