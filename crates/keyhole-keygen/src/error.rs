pub use keyhole_core::KeyError;

/// Result type for allocation and replenishment.
pub type Result<T> = std::result::Result<T, KeyError>;
