use std::time::Duration;
use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The unused-keys reservoir had nothing to hand out.
    #[error("no unused keys available")]
    NotFound,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("random source failed: {0}")]
    Entropy(String),
    #[error("invalid key length: {0}")]
    InvalidLength(usize),
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Errors surfaced by key allocation and replenishment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("no free keys")]
    NotFound,
    #[error("key already in use: {0}")]
    AlreadyUsed(String),
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl KeyError {
    /// Whether the allocator should pull another candidate after this error.
    ///
    /// Only an empty reservoir and a lost claim are transient; every other
    /// failure is surfaced to the caller as is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KeyError::NotFound | KeyError::AlreadyUsed(_))
    }
}

impl From<StorageError> for KeyError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound => KeyError::NotFound,
            other => KeyError::Storage(other),
        }
    }
}
