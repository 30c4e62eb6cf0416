pub mod random;
pub mod seq;

pub use random::RandomGenerator;
pub use seq::SeqGenerator;

use keyhole_core::GeneratorError;

/// Trait for proposing candidate keys.
///
/// Implementations are pure generators that don't interact with storage.
/// Uniqueness is not their concern: the replenisher checks every candidate
/// against both repositories before it becomes available.
pub trait Generator: Send + Sync + 'static {
    /// Proposes the next candidate key.
    ///
    /// A failing source must return an error rather than a weaker key.
    fn generate(&self) -> Result<String, GeneratorError>;
}

impl<G: Generator + ?Sized> Generator for Box<G> {
    fn generate(&self) -> Result<String, GeneratorError> {
        (**self).generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_generators_are_generators() {
        let generators: Vec<Box<dyn Generator>> = vec![
            Box::new(SeqGenerator::with_prefix("kh")),
            Box::new(RandomGenerator::new(8).unwrap()),
        ];

        for generator in &generators {
            let key = generator.generate().unwrap();
            assert_eq!(key.len(), 8);
            keyhole_core::validate_key(&key).unwrap();
        }
    }
}
