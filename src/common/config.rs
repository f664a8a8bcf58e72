//! Configuration constants and buffer pool settings.

use std::time::Duration;

/// Size of a page in bytes (4KB).
///
/// Shared by every heap file and the buffer pool. Files carry no header, so
/// changing this value invalidates every existing table file.
///
/// # Memory Layout
/// With 4KB pages and 32-bit page numbers:
/// - Max pages per table: 2^32
/// - Max table size: 2^32 × 4KB = 16TB
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of payload bytes stored for a string field.
///
/// Strings are fixed width on disk: a 4-byte length prefix followed by
/// `STRING_LEN` bytes, zero padded.
pub const STRING_LEN: usize = 128;

/// Default number of pages held by the buffer pool.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Default bound on how long a lock request may wait before its transaction
/// is aborted.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of pages addressable in one table with u32 page numbers.
pub const MAX_PAGES: u64 = (u32::MAX as u64) + 1;

/// Maximum theoretical table size in bytes.
pub const MAX_TABLE_SIZE_BYTES: u64 = MAX_PAGES * PAGE_SIZE as u64;

/// Settings for a [`BufferPool`](crate::buffer::BufferPool).
///
/// # Example
/// ```
/// use std::time::Duration;
/// use heapdb::BufferPoolConfig;
///
/// let config = BufferPoolConfig::default()
///     .with_num_pages(8)
///     .with_lock_timeout(Duration::from_millis(200));
/// assert_eq!(config.num_pages, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of pages the cache may hold at once.
    pub num_pages: usize,

    /// How long a lock request may block before giving up.
    pub lock_timeout: Duration,
}

impl BufferPoolConfig {
    /// Create a config with the given capacity and the default lock timeout.
    pub fn new(num_pages: usize) -> Self {
        Self {
            num_pages,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Set the cache capacity in pages.
    pub fn with_num_pages(mut self, num_pages: usize) -> Self {
        self.num_pages = num_pages;
        self
    }

    /// Set the lock wait bound.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_PAGES)
    }
}
