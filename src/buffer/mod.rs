//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache layer between transactions and
//! heap files. It holds a fixed number of decoded pages and gates every
//! access behind a page lock.
//!
//! # Components
//! - [`BufferPool`] - The page cache and transaction protocol
//! - [`LruCache`] - Recency-ordered cache with an eviction hook
//! - [`BufferPoolStats`] - Hit/miss and I/O counters

mod buffer_pool;
mod lru_cache;
mod stats;

pub use buffer_pool::{BufferPool, PageRef, Permissions};
pub use lru_cache::LruCache;
pub use stats::{BufferPoolStats, StatsSnapshot};
