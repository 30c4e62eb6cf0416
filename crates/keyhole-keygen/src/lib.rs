//! Key pool allocation for short links.
//!
//! Two halves share the same pair of repositories:
//!
//! - [`Allocator`] is the request-facing side. Each call pops a candidate
//!   from the unused-key reservoir and claims it in the used-key registry,
//!   retrying on an empty reservoir or a lost claim until it succeeds or the
//!   caller gives up.
//! - [`Replenisher`] is the background side. On every tick it tops the
//!   reservoir up with fresh random keys that are not currently claimed.
//!
//! No lock is held in-process across repository calls; all coordination
//! relies on the atomic operations of the stores, so several processes can
//! share the same backends.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keyhole_keygen::{spawn_replenisher, Allocator, AllocatorConfig, GeneratorConfig};
//! use keyhole_storage::{InMemoryUnusedKeys, InMemoryUsedKeys};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let used = Arc::new(InMemoryUsedKeys::new());
//! let unused = Arc::new(InMemoryUnusedKeys::new());
//! let shutdown = CancellationToken::new();
//!
//! spawn_replenisher(
//!     shutdown.child_token(),
//!     GeneratorConfig::default(),
//!     used.clone(),
//!     unused.clone(),
//! );
//!
//! let allocator = Allocator::new(AllocatorConfig::default(), used, unused);
//! let key = allocator.use_key(&shutdown).await?;
//! println!("{} expires at {}", key, key.expires_at);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod config;
pub mod error;
pub mod replenisher;

#[cfg(test)]
mod test_support;

pub use allocator::Allocator;
pub use config::{AllocatorConfig, GeneratorConfig};
pub use error::{KeyError, Result};
pub use replenisher::{batch_size, generate, spawn_replenisher, Replenisher, TickReport};
