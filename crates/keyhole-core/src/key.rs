use crate::error::GeneratorError;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The 64 characters a key may be built from.
pub const ALPHABET: &[u8; 64] =
    b"-_1234567890abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// A key issued to a caller.
///
/// The expiry is assigned when the key is claimed, not when it was generated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    /// The short identifier itself.
    pub value: String,
    /// When the claim on this key lapses.
    pub expires_at: Timestamp,
}

impl Key {
    pub fn new(value: impl Into<String>, expires_at: Timestamp) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Checks that a key value is non-empty and drawn only from [`ALPHABET`].
pub fn validate_key(value: &str) -> Result<(), GeneratorError> {
    if value.is_empty() {
        return Err(GeneratorError::InvalidLength(0));
    }

    if !value.bytes().all(|b| ALPHABET.contains(&b)) {
        return Err(GeneratorError::InvalidKey(format!(
            "key must contain only alphanumeric characters, hyphens, or underscores: '{}'",
            value
        )));
    }

    Ok(())
}
