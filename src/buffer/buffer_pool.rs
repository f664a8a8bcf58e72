//! Buffer Pool - the page cache in front of every table access.
//!
//! The [`BufferPool`] provides:
//! - Page caching between heap files and memory (LRU order)
//! - Page-level locking before every access (strict 2PL)
//! - NO-STEAL eviction: dirty pages never leave memory before commit
//! - Commit (flush) and abort (discard) of a transaction's pages

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::buffer::{BufferPoolStats, LruCache};
use crate::catalog::Catalog;
use crate::common::{BufferPoolConfig, Error, PageId, Result, TableId, TransactionId};
use crate::concurrency::{LockManager, LockMode};
use crate::storage::page::HeapPage;
use crate::tuple::Tuple;

/// A cached page shared between the pool and its callers.
///
/// The `RwLock` is a short-lived latch over the page contents. It is distinct
/// from the transactional lock taken by [`BufferPool::get_page`] and must
/// not be held while calling back into the pool.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Access intent for a page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    /// Shared lock.
    ReadOnly,
    /// Exclusive lock.
    ReadWrite,
}

impl Permissions {
    fn lock_mode(self) -> LockMode {
        match self {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        }
    }
}

/// Caches pages of every table in the catalog and mediates access to them.
///
/// # Architecture
/// ```text
/// ┌────────────────────────────────────────────────────────────┐
/// │                        BufferPool                          │
/// │  ┌──────────────────────────┐   ┌───────────────────────┐  │
/// │  │ cache: LruCache          │   │ lock_manager          │  │
/// │  │ PageId → PageRef         │   │ PageId → {mode, tids} │  │
/// │  └──────────────────────────┘   └───────────────────────┘  │
/// │  ┌──────────────────────────┐   ┌───────────────────────┐  │
/// │  │ dirtied                  │   │ catalog               │  │
/// │  │ TransactionId → {PageId} │   │ TableId → HeapFile    │  │
/// │  └──────────────────────────┘   └───────────────────────┘  │
/// └────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `cache`: `Mutex`, never held while waiting for a page lock
/// - `dirtied`: `Mutex`, held only to update the registry
/// - `lock_manager`: internally synchronized
/// - `stats`: no lock, all atomic counters
///
/// Lock order is cache mutex, then page latch. Nothing takes the cache
/// mutex while holding a latch.
///
/// # Usage
/// ```ignore
/// let tid = TransactionId::new();
/// let page = pool.get_page(tid, pid, Permissions::ReadOnly)?;
/// let count = page.read().iter().count();
/// pool.transaction_complete(tid, true)?;
/// ```
pub struct BufferPool {
    cache: Mutex<LruCache<PageId, PageRef>>,

    lock_manager: LockManager,

    /// Pages modified by each live transaction.
    dirtied: Mutex<HashMap<TransactionId, HashSet<PageId>>>,

    catalog: Arc<Catalog>,

    stats: BufferPoolStats,

    pool_size: usize,
}

impl BufferPool {
    /// Create a buffer pool over the tables of `catalog`.
    ///
    /// # Panics
    /// Panics if `config.num_pages` is 0.
    pub fn new(config: BufferPoolConfig, catalog: Arc<Catalog>) -> Self {
        assert!(config.num_pages > 0, "num_pages must be > 0");

        Self {
            cache: Mutex::new(LruCache::new(config.num_pages)),
            lock_manager: LockManager::with_timeout(config.lock_timeout),
            dirtied: Mutex::new(HashMap::new()),
            catalog,
            stats: BufferPoolStats::new(),
            pool_size: config.num_pages,
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Fetch a page on behalf of `tid`.
    ///
    /// Takes a shared lock for `ReadOnly` and an exclusive lock for
    /// `ReadWrite`, blocking until it is granted. The lock is kept until the
    /// transaction completes. A resident page is returned directly (and
    /// becomes most recently used); otherwise it is read from its heap file,
    /// evicting the least recently used clean page if the pool is full.
    ///
    /// # Errors
    /// - `Error::Deadlock` / `Error::LockTimeout`: the transaction must abort
    /// - `Error::BufferFull` if the pool is full of dirty pages
    /// - `Error::TableNotFound` / `Error::PageNotFound` for unknown pages
    pub fn get_page(&self, tid: TransactionId, pid: PageId, perm: Permissions) -> Result<PageRef> {
        self.lock_manager.acquire(tid, pid, perm.lock_mode())?;

        if let Some(page) = self.cache.lock().get(&pid) {
            self.stats.record_hit();
            return Ok(Arc::clone(page));
        }
        self.stats.record_miss();

        let file = self.catalog.file(pid.table_id)?;
        let page = file.read_page(pid)?;
        self.stats.record_read();
        debug!(%tid, page = %pid, "loaded page from disk");

        let mut cache = self.cache.lock();
        // Another shared holder may have loaded it while we were reading.
        // This request still counts as the miss and read recorded above.
        if let Some(cached) = cache.get(&pid) {
            return Ok(Arc::clone(cached));
        }

        let page: PageRef = Arc::new(RwLock::new(page));
        self.insert_resident(&mut cache, pid, Arc::clone(&page))?;
        Ok(page)
    }

    // ========================================================================
    // Public API: Tuple operations
    // ========================================================================

    /// Insert `tuple` into table `table_id` on behalf of `tid`.
    ///
    /// Every page touched is marked dirty by `tid` and kept resident until
    /// the transaction completes. On success the tuple carries its new
    /// record id.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<()> {
        let file = self.catalog.file(table_id)?;
        let pages = file.insert_tuple(self, tid, tuple)?;
        self.mark_dirtied(tid, pages)
    }

    /// Delete `tuple` (located by its record id) on behalf of `tid`.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let rid = tuple
            .record_id()
            // no record id: the tuple was never stored
            .ok_or(Error::TupleNotFound(PageId::new(TableId(0), 0)))?;

        let file = self.catalog.file(rid.page_id.table_id)?;
        let pages = file.delete_tuple(self, tid, tuple)?;
        self.mark_dirtied(tid, pages)
    }

    // ========================================================================
    // Public API: Flush and discard
    // ========================================================================

    /// Write a resident page back to disk if it is dirty.
    ///
    /// No-op for clean or non-resident pages.
    pub fn flush_page(&self, pid: PageId) -> Result<()> {
        let page = self.cache.lock().peek(&pid).cloned();
        match page {
            Some(page) => self.write_back(&page),
            None => Ok(()),
        }
    }

    /// Flush every page dirtied by `tid`.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        for pid in self.dirtied_by(tid) {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Flush every dirty resident page, whoever dirtied it.
    ///
    /// Writes uncommitted data; meant for tests and shutdown.
    pub fn flush_all_pages(&self) -> Result<()> {
        let pages: Vec<PageRef> = self.cache.lock().values().into_iter().cloned().collect();
        for page in &pages {
            self.write_back(page)?;
        }
        Ok(())
    }

    /// Drop a page from the cache without writing it.
    pub fn discard_page(&self, pid: PageId) {
        if self.cache.lock().remove(&pid).is_some() {
            self.stats.record_discard();
            debug!(page = %pid, "discarded page");
        }
    }

    // ========================================================================
    // Public API: Transactions and locks
    // ========================================================================

    /// Finish `tid`: flush (commit) or discard (abort) its dirtied pages,
    /// then release all of its locks.
    ///
    /// # Errors
    /// A failed commit flush is returned with the transaction's locks still
    /// held and its pages still registered, so the caller can abort instead.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        if commit {
            self.flush_pages(tid)?;
        } else {
            for pid in self.dirtied_by(tid) {
                self.discard_page(pid);
            }
        }

        self.dirtied.lock().remove(&tid);
        let released = self.lock_manager.release_all(tid);
        debug!(%tid, commit, released, "transaction complete");
        Ok(())
    }

    /// Whether `tid` holds any lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds_lock(tid, pid)
    }

    /// Release `tid`'s lock on `pid` before the transaction completes.
    ///
    /// Breaks strict two-phase locking; only for pages `tid` has not
    /// modified.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.release(tid, pid)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Maximum number of resident pages.
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of currently resident pages.
    pub fn page_count(&self) -> usize {
        self.cache.lock().len()
    }

    #[inline]
    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    #[inline]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn dirtied_by(&self, tid: TransactionId) -> Vec<PageId> {
        self.dirtied
            .lock()
            .get(&tid)
            .map(|pids| pids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Mark pages modified by `tid` and make sure they stay resident.
    ///
    /// A page fetched for writing is still clean until it gets here, so it
    /// may have been evicted in between. It is put back in that case.
    fn mark_dirtied(&self, tid: TransactionId, pages: Vec<PageRef>) -> Result<()> {
        for page in pages {
            let pid = {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.id()
            };
            self.dirtied.lock().entry(tid).or_default().insert(pid);

            let mut cache = self.cache.lock();
            let resident = cache
                .peek(&pid)
                .is_some_and(|cached| Arc::ptr_eq(cached, &page));
            if !resident {
                self.insert_resident(&mut cache, pid, page)?;
            }
        }
        Ok(())
    }

    /// Insert a page into the cache, evicting a clean page if full.
    fn insert_resident(
        &self,
        cache: &mut LruCache<PageId, PageRef>,
        pid: PageId,
        page: PageRef,
    ) -> Result<()> {
        if !cache.contains(&pid) {
            self.make_room(cache)?;
        }

        cache.put(pid, page, |_, evicted| {
            if evicted.read().is_dirty() {
                return Err(Error::BufferFull(self.pool_size));
            }
            Ok(())
        })
    }

    /// Evict the least recently used clean page if the cache is full.
    fn make_room(&self, cache: &mut LruCache<PageId, PageRef>) -> Result<()> {
        if cache.len() < cache.capacity() {
            return Ok(());
        }

        let victim = cache
            .least_recent_where(|_, page| !page.read().is_dirty())
            .copied();

        match victim {
            Some(pid) => {
                cache.remove(&pid);
                self.stats.record_eviction();
                debug!(page = %pid, "evicted clean page");
                Ok(())
            }
            None => {
                self.stats.record_eviction_failure();
                Err(Error::BufferFull(cache.len()))
            }
        }
    }

    /// Write `page` to its heap file if dirty and mark it clean.
    fn write_back(&self, page: &PageRef) -> Result<()> {
        let mut guard = page.write();
        if !guard.is_dirty() {
            return Ok(());
        }

        let file = self.catalog.file(guard.id().table_id)?;
        file.write_page(&guard)?;
        guard.mark_dirty(None);
        self.stats.record_write();
        debug!(page = %guard.id(), "flushed page");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StatsSnapshot;
    use crate::storage::HeapFile;
    use crate::tuple::{Field, TupleDesc, Type};
    use tempfile::{tempdir, TempDir};

    fn setup(pool_pages: usize, table_pages: u32) -> (TempDir, BufferPool, TableId) {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(
            dir.path().join("t.dat"),
            TupleDesc::new(vec![Type::Int, Type::Int]),
        )
        .unwrap();
        for _ in 0..table_pages {
            file.allocate_page().unwrap();
        }

        let catalog = Arc::new(Catalog::new());
        let table_id = catalog.add_table(file, "t", "");
        let pool = BufferPool::new(BufferPoolConfig::new(pool_pages), catalog);
        (dir, pool, table_id)
    }

    fn tuple(pool: &BufferPool, table_id: TableId, a: i32, b: i32) -> Tuple {
        let desc = pool.catalog().tuple_desc(table_id).unwrap();
        Tuple::new(desc, vec![Field::Int(a), Field::Int(b)])
    }

    fn count_tuples(pool: &BufferPool, table_id: TableId, tid: TransactionId) -> usize {
        let file = pool.catalog().file(table_id).unwrap();
        file.iter(pool, tid).map(|t| t.unwrap()).count()
    }

    #[test]
    fn test_get_page_caches() {
        let (_dir, pool, table_id) = setup(4, 2);
        let tid = TransactionId::new();
        let pid = PageId::new(table_id, 0);

        let a = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();
        let b = pool.get_page(tid, pid, Permissions::ReadOnly).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.page_count(), 1);
        let stats = pool.stats().snapshot();
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.pages_read, 1);
        assert!(pool.holds_lock(tid, pid));
    }

    #[test]
    fn test_get_page_past_end() {
        let (_dir, pool, table_id) = setup(4, 1);
        let pid = PageId::new(table_id, 5);

        let result = pool.get_page(TransactionId::new(), pid, Permissions::ReadOnly);
        assert!(matches!(result, Err(Error::PageNotFound(p)) if p == pid));
    }

    #[test]
    fn test_get_page_unknown_table() {
        let (_dir, pool, _) = setup(4, 1);
        let pid = PageId::new(TableId(12345), 0);

        let result = pool.get_page(TransactionId::new(), pid, Permissions::ReadOnly);
        assert!(matches!(result, Err(Error::TableNotFound(_))));
    }

    #[test]
    fn test_evicts_least_recent_clean_page() {
        let (_dir, pool, table_id) = setup(2, 3);
        let tid = TransactionId::new();

        for no in 0..3 {
            pool.get_page(tid, PageId::new(table_id, no), Permissions::ReadOnly)
                .unwrap();
        }

        assert_eq!(pool.page_count(), 2);
        assert_eq!(pool.stats().snapshot().evictions, 1);
        assert!(!pool.cache.lock().contains(&PageId::new(table_id, 0)));
    }

    #[test]
    fn test_dirty_pages_are_never_evicted() {
        let (_dir, pool, table_id) = setup(1, 2);
        let tid = TransactionId::new();

        let mut t = tuple(&pool, table_id, 1, 2);
        pool.insert_tuple(tid, table_id, &mut t).unwrap();
        assert_eq!(t.record_id().unwrap().page_id, PageId::new(table_id, 0));

        let result = pool.get_page(tid, PageId::new(table_id, 1), Permissions::ReadOnly);
        assert!(matches!(result, Err(Error::BufferFull(1))));
        assert_eq!(pool.stats().snapshot().eviction_failures, 1);

        // the dirty page is still resident and intact
        let page = pool.get_page(tid, PageId::new(table_id, 0), Permissions::ReadOnly).unwrap();
        assert_eq!(page.read().dirtier(), Some(tid));
        assert_eq!(page.read().iter().count(), 1);
    }

    #[test]
    fn test_commit_flushes_to_disk() {
        let (_dir, pool, table_id) = setup(4, 0);
        let tid = TransactionId::new();

        let mut t = tuple(&pool, table_id, 10, 20);
        pool.insert_tuple(tid, table_id, &mut t).unwrap();
        pool.transaction_complete(tid, true).unwrap();

        let file = pool.catalog().file(table_id).unwrap();
        let on_disk = file.read_page(PageId::new(table_id, 0)).unwrap();
        assert_eq!(on_disk.iter().next(), Some(&t));
        assert!(!pool.holds_lock(tid, PageId::new(table_id, 0)));
        assert_eq!(pool.stats().snapshot().pages_written, 1);

        // the flushed page stays resident and clean
        let page = pool.cache.lock().peek(&PageId::new(table_id, 0)).cloned().unwrap();
        assert!(!page.read().is_dirty());
    }

    #[test]
    fn test_abort_discards_changes() {
        let (_dir, pool, table_id) = setup(4, 1);
        let tid = TransactionId::new();

        let mut t = tuple(&pool, table_id, 1, 1);
        pool.insert_tuple(tid, table_id, &mut t).unwrap();
        pool.transaction_complete(tid, false).unwrap();

        assert_eq!(pool.page_count(), 0);
        assert_eq!(pool.stats().snapshot().pages_discarded, 1);
        assert_eq!(count_tuples(&pool, table_id, TransactionId::new()), 0);
    }

    #[test]
    fn test_delete_tuple() {
        let (_dir, pool, table_id) = setup(4, 0);
        let tid = TransactionId::new();

        let mut a = tuple(&pool, table_id, 1, 1);
        let mut b = tuple(&pool, table_id, 2, 2);
        pool.insert_tuple(tid, table_id, &mut a).unwrap();
        pool.insert_tuple(tid, table_id, &mut b).unwrap();

        pool.delete_tuple(tid, &a).unwrap();
        assert!(matches!(pool.delete_tuple(tid, &a), Err(Error::TupleNotFound(_))));

        let remaining: Vec<Tuple> = pool
            .catalog()
            .file(table_id)
            .unwrap()
            .iter(&pool, tid)
            .map(|t| t.unwrap())
            .collect();
        assert_eq!(remaining, vec![b]);
    }

    #[test]
    fn test_delete_without_record_id() {
        let (_dir, pool, table_id) = setup(4, 0);
        let t = tuple(&pool, table_id, 1, 1);

        let result = pool.delete_tuple(TransactionId::new(), &t);
        assert!(matches!(result, Err(Error::TupleNotFound(_))));
    }

    #[test]
    fn test_long_string_deletes_after_reload() {
        let dir = tempdir().unwrap();
        let file = HeapFile::open(
            dir.path().join("s.dat"),
            TupleDesc::new(vec![Type::Int, Type::String]),
        )
        .unwrap();
        let catalog = Arc::new(Catalog::new());
        let table_id = catalog.add_table(file, "s", "");
        let pool = BufferPool::new(BufferPoolConfig::new(4), catalog);

        let desc = pool.catalog().tuple_desc(table_id).unwrap();
        let mut t = Tuple::new(desc, vec![Field::Int(1), Field::String("y".repeat(200))]);
        let tid = TransactionId::new();
        pool.insert_tuple(tid, table_id, &mut t).unwrap();
        pool.transaction_complete(tid, true).unwrap();

        // force the next access to decode the page from disk
        pool.discard_page(PageId::new(table_id, 0));

        let tid = TransactionId::new();
        pool.delete_tuple(tid, &t).unwrap();
        pool.transaction_complete(tid, true).unwrap();
        assert_eq!(count_tuples(&pool, table_id, TransactionId::new()), 0);
    }

    #[test]
    fn test_flush_all_pages() {
        let (_dir, pool, table_id) = setup(4, 0);
        let tid = TransactionId::new();

        let mut t = tuple(&pool, table_id, 3, 4);
        pool.insert_tuple(tid, table_id, &mut t).unwrap();
        pool.flush_all_pages().unwrap();

        let file = pool.catalog().file(table_id).unwrap();
        assert_eq!(file.read_page(PageId::new(table_id, 0)).unwrap().iter().count(), 1);

        // flushing again writes nothing
        pool.flush_all_pages().unwrap();
        assert_eq!(pool.stats().snapshot().pages_written, 1);
    }

    #[test]
    fn test_flush_absent_page_is_noop() {
        let (_dir, pool, table_id) = setup(4, 1);
        pool.flush_page(PageId::new(table_id, 0)).unwrap();
        pool.discard_page(PageId::new(table_id, 0));
        assert_eq!(pool.stats().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_release_page() {
        let (_dir, pool, table_id) = setup(4, 1);
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        let pid = PageId::new(table_id, 0);

        pool.get_page(t1, pid, Permissions::ReadWrite).unwrap();
        assert!(pool.release_page(t1, pid));
        assert!(!pool.holds_lock(t1, pid));

        pool.get_page(t2, pid, Permissions::ReadWrite).unwrap();
        assert!(pool.holds_lock(t2, pid));
    }

    #[test]
    #[should_panic(expected = "num_pages must be > 0")]
    fn test_zero_pool_size_panics() {
        let _ = BufferPool::new(BufferPoolConfig::new(0), Arc::new(Catalog::new()));
    }
}
