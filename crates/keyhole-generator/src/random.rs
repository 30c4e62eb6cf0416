use crate::Generator;
use keyhole_core::{GeneratorError, ALPHABET};
use rand::rngs::OsRng;
use rand::TryRngCore;

// 256 is a multiple of the alphabet size, so masking a random byte keeps
// every character equally likely.
const _: () = assert!(256 % ALPHABET.len() == 0);
const INDEX_MASK: u8 = (ALPHABET.len() - 1) as u8;

/// Produces fixed-length keys from the operating system's CSPRNG.
///
/// Each character is drawn independently and uniformly from [`ALPHABET`].
/// There is no seedable or time-based fallback: if the OS source fails,
/// generation fails.
#[derive(Debug, Clone, Copy)]
pub struct RandomGenerator {
    len: usize,
}

impl RandomGenerator {
    /// Creates a generator for keys of `len` characters.
    pub fn new(len: usize) -> Result<Self, GeneratorError> {
        if len == 0 {
            return Err(GeneratorError::InvalidLength(len));
        }
        Ok(Self { len })
    }
}

impl Generator for RandomGenerator {
    fn generate(&self) -> Result<String, GeneratorError> {
        let mut buf = vec![0_u8; self.len];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| GeneratorError::Entropy(e.to_string()))?;

        Ok(buf
            .into_iter()
            .map(|b| ALPHABET[(b & INDEX_MASK) as usize] as char)
            .collect())
    }
}
