//! Heap File - one table stored as a sequence of heap pages.
//!
//! The [`HeapFile`] handles all direct file operations for a table:
//! - Reading and writing pages
//! - Appending new empty pages
//! - Tuple insert/delete and scans, routed through the buffer pool

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{BufferPool, PageRef, Permissions};
use crate::common::config::{MAX_PAGES, MAX_TABLE_SIZE_BYTES, PAGE_SIZE};
use crate::common::{Error, PageId, Result, TableId, TransactionId};
use crate::storage::page::HeapPage;
use crate::tuple::{Tuple, TupleDesc};

/// An unordered collection of same-schema tuples backed by one file.
///
/// # File Layout
/// Pages are laid out back to back with no file header:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// The schema is not stored in the file. It is supplied when the file is
/// opened (usually by the catalog), so the same bytes read with a different
/// schema decode to garbage.
///
/// # Thread Safety
/// The file handle sits behind a `Mutex`, so page reads, writes and appends
/// from different threads are serialized. Logical isolation between
/// transactions is the buffer pool's job, not the file's.
pub struct HeapFile {
    id: TableId,
    path: PathBuf,
    desc: Arc<TupleDesc>,
    file: Mutex<File>,
}

impl HeapFile {
    /// Open the table file at `path`, creating an empty one if needed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P, desc: TupleDesc) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let path = fs::canonicalize(path)?;
        let id = TableId::from_path(&path);
        debug!(table = %id, path = %path.display(), "opened heap file");

        Ok(Self {
            id,
            path,
            desc: Arc::new(desc),
            file: Mutex::new(file),
        })
    }

    /// Stable id of this table, derived from its absolute path.
    #[inline]
    pub fn id(&self) -> TableId {
        self.id
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    /// Number of pages in the file.
    pub fn num_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        Self::page_count(&file)
    }

    /// Read and decode a page from disk.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page belongs to another table or lies
    ///   past the end of the file
    /// - `Error::Io` on a failed seek or short read
    pub fn read_page(&self, pid: PageId) -> Result<HeapPage> {
        let mut buf = vec![0u8; PAGE_SIZE];
        {
            let mut file = self.file.lock();
            self.check_page(&file, pid)?;
            file.seek(SeekFrom::Start(pid.offset()))?;
            file.read_exact(&mut buf)?;
        }

        HeapPage::new(pid, Arc::clone(&self.desc), &buf)
    }

    /// Write a page back to its slot in the file.
    ///
    /// Pages never change size, so this always overwrites in place.
    ///
    /// # Durability
    /// Calls `fsync()` after writing.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page hasn't been allocated.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let pid = page.id();
        let data = page.page_data();

        let mut file = self.file.lock();
        self.check_page(&file, pid)?;
        file.seek(SeekFrom::Start(pid.offset()))?;
        file.write_all(&data)?;
        file.sync_all()?;

        Ok(())
    }

    /// Append an empty page and return its id.
    ///
    /// The file grows by exactly `PAGE_SIZE` bytes. Concurrent callers get
    /// distinct page numbers.
    ///
    /// # Errors
    /// Returns an I/O error once the table holds `MAX_PAGES - 1` pages, the
    /// most whose count still fits a page number.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut file = self.file.lock();
        let page_no = Self::page_count(&file)?;
        check_room_after(page_no)?;
        let pid = PageId::new(self.id, page_no);

        file.seek(SeekFrom::Start(pid.offset()))?;
        file.write_all(&HeapPage::create_empty_page_data())?;
        file.sync_all()?;

        debug!(page = %pid, "allocated heap page");
        Ok(pid)
    }

    // ========================================================================
    // Tuple operations (through the buffer pool)
    // ========================================================================

    /// Insert `tuple` into the first page with a free slot.
    ///
    /// Existing pages are visited in order under an exclusive lock. When all
    /// of them are full a new page is appended and fetched through the pool,
    /// so it is tracked like any other page. Returns the dirtied pages.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        if !tuple.matches_desc(&self.desc) {
            return Err(Error::SchemaMismatch {
                expected: self.desc.to_string(),
            });
        }

        for page_no in 0..self.num_pages()? {
            let pid = PageId::new(self.id, page_no);
            let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;

            let inserted = {
                let mut guard = page.write();
                if guard.num_empty_slots() > 0 {
                    guard.insert_tuple(tuple)?;
                    true
                } else {
                    false
                }
            };

            if inserted {
                return Ok(vec![page]);
            }
        }

        let pid = self.allocate_page()?;
        let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
        page.write().insert_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Delete `tuple` from the page its record id names.
    ///
    /// Returns the dirtied pages.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let rid = match tuple.record_id() {
            Some(rid) if rid.page_id.table_id == self.id => rid,
            Some(rid) => return Err(Error::TupleNotFound(rid.page_id)),
            None => return Err(Error::TupleNotFound(PageId::new(self.id, 0))),
        };

        let page = pool.get_page(tid, rid.page_id, Permissions::ReadWrite)?;
        page.write().delete_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Scan every tuple of the table under `tid`.
    pub fn iter<'a>(&self, pool: &'a BufferPool, tid: TransactionId) -> HeapFileIter<'a> {
        HeapFileIter::new(pool, tid, self.id)
    }

    fn page_count(file: &File) -> Result<u32> {
        pages_in(file.metadata()?.len())
    }

    fn check_page(&self, file: &File, pid: PageId) -> Result<()> {
        if pid.table_id != self.id || pid.page_no >= Self::page_count(file)? {
            return Err(Error::PageNotFound(pid));
        }
        Ok(())
    }
}

/// Number of whole pages in a file of `len` bytes.
fn pages_in(len: u64) -> Result<u32> {
    if len >= MAX_TABLE_SIZE_BYTES {
        return Err(too_large());
    }
    Ok((len / PAGE_SIZE as u64) as u32)
}

/// Fail if appending page `page_no` would leave more pages than a `u32`
/// count can describe.
fn check_room_after(page_no: u32) -> Result<()> {
    if u64::from(page_no) + 1 >= MAX_PAGES {
        return Err(too_large());
    }
    Ok(())
}

fn too_large() -> Error {
    Error::Io(std::io::Error::other(format!(
        "heap file would exceed {} pages",
        MAX_PAGES - 1
    )))
}

/// Lazy scan over all tuples of a heap file, page by page.
///
/// Each page is fetched through the buffer pool with a shared lock the first
/// time the scan reaches it. The page count is re-read whenever the scan
/// moves past a page, so pages appended by the same transaction are seen.
///
/// # Lifecycle
/// - [`open`](Self::open) positions the scan at page 0 (called implicitly by
///   the first `next`)
/// - [`rewind`](Self::rewind) restarts from page 0 and re-acquires it
/// - [`close`](Self::close) ends the scan; `next` returns `None` until
///   [`open`](Self::open) or [`rewind`](Self::rewind) starts it again
///
/// An error is yielded once and ends the scan.
pub struct HeapFileIter<'a> {
    pool: &'a BufferPool,
    tid: TransactionId,
    table_id: TableId,
    state: ScanState,
}

enum ScanState {
    Unopened,
    Closed,
    Scanning {
        page_no: u32,
        page: PageRef,
        slot: usize,
    },
    Done,
}

impl<'a> HeapFileIter<'a> {
    fn new(pool: &'a BufferPool, tid: TransactionId, table_id: TableId) -> Self {
        Self {
            pool,
            tid,
            table_id,
            state: ScanState::Unopened,
        }
    }

    /// Start the scan at page 0. No-op if already open.
    pub fn open(&mut self) -> Result<()> {
        if let ScanState::Unopened | ScanState::Closed = self.state {
            self.state = self.load_from(0)?;
        }
        Ok(())
    }

    /// Restart the scan from page 0.
    pub fn rewind(&mut self) -> Result<()> {
        self.state = ScanState::Unopened;
        self.open()
    }

    /// End the scan and drop the current page.
    pub fn close(&mut self) {
        self.state = ScanState::Closed;
    }

    /// Position at the first existing page at or after `page_no`.
    fn load_from(&self, page_no: u32) -> Result<ScanState> {
        let file = self.pool.catalog().file(self.table_id)?;
        if page_no >= file.num_pages()? {
            return Ok(ScanState::Done);
        }

        let pid = PageId::new(self.table_id, page_no);
        let page = self.pool.get_page(self.tid, pid, Permissions::ReadOnly)?;
        Ok(ScanState::Scanning {
            page_no,
            page,
            slot: 0,
        })
    }

    fn advance(&mut self) -> Result<Option<Tuple>> {
        if let ScanState::Unopened = self.state {
            self.open()?;
        }

        loop {
            let next_page = match &mut self.state {
                ScanState::Unopened | ScanState::Closed | ScanState::Done => return Ok(None),
                ScanState::Scanning {
                    page_no,
                    page,
                    slot,
                } => {
                    let guard = page.read();
                    match guard.next_used_slot(*slot) {
                        Some(found) => {
                            *slot = found + 1;
                            return Ok(guard.tuple_at(found).cloned());
                        }
                        None => *page_no + 1,
                    }
                }
            };

            self.state = self.load_from(next_page)?;
        }
    }
}

impl Iterator for HeapFileIter<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => None,
            Err(e) => {
                self.state = ScanState::Done;
                Some(Err(e))
            }
        }
    }
}
