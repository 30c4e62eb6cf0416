//! Core types and traits for the Keyhole key pool.
//!
//! This crate provides the shared [`Key`] type, the two repository
//! contracts the allocator is built on ([`UnusedKeys`] and [`UsedKeys`]),
//! and the error taxonomy used across the workspace.

pub mod error;
pub mod key;
pub mod repository;

pub use error::{GeneratorError, KeyError, StorageError};
pub use key::{validate_key, Key, ALPHABET};
pub use repository::{UnusedKeys, UsedKeys};
