//! Storage adapters for the key pool repositories.
//!
//! Unused keys live in a set-like store (Redis or memory); used keys live in
//! a store with per-key expiry (Redis, MySQL or memory). The allocator only
//! sees the [`UnusedKeys`] and [`UsedKeys`] traits.

mod error;
pub mod memory;
pub mod mysql;
pub mod redis;

pub use keyhole_core::error::Result;
pub use keyhole_core::{StorageError, UnusedKeys, UsedKeys};
pub use memory::{InMemoryUnusedKeys, InMemoryUsedKeys};
pub use mysql::MySqlUsedKeys;
pub use self::redis::{RedisUnusedKeys, RedisUsedKeys};
