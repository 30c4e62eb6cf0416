use crate::Generator;
use keyhole_core::GeneratorError;
use std::sync::atomic::{AtomicU64, Ordering};

/// A predictable key generator using a sequential counter.
///
/// This generator produces codes like "kh000000", "kh000001", etc. It is
/// meant for tests and local runs where reproducible keys are more useful
/// than unpredictable ones; never use it for keys exposed to users.
///
/// The prefix must only contain characters from the key alphabet.
#[derive(Debug)]
pub struct SeqGenerator {
    counter: AtomicU64,
    prefix: String,
}

impl Clone for SeqGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
            prefix: self.prefix.clone(),
        }
    }
}

impl SeqGenerator {
    /// Creates a new sequential generator with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_offset(prefix, 0)
    }

    /// Creates a new sequential generator starting from a specific counter value.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
            prefix: prefix.into(),
        }
    }
}

impl Generator for SeqGenerator {
    fn generate(&self) -> Result<String, GeneratorError> {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}{:06}", self.prefix, count))
    }
}
