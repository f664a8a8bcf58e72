//! Table and page identifier types.

use std::fmt;
use std::path::Path;

/// Identifies a table (and its heap file).
///
/// Derived from the CRC32 of the file's absolute path, so the same backing
/// file always maps to the same id, across calls and across runs.
///
/// # Example
/// ```
/// use heapdb::TableId;
///
/// let a = TableId::from_path("/data/students.dat");
/// let b = TableId::from_path("/data/students.dat");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl TableId {
    /// Hash a path into a table id.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_string_lossy();
        TableId(crc32fast::hash(path.as_bytes()))
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a page: the owning table plus the page number within its file.
///
/// Page `n` lives at byte offset `n × PAGE_SIZE` of the table's file.
///
/// # Example
/// ```
/// use heapdb::{PageId, TableId};
///
/// let pid = PageId::new(TableId(1), 42);
/// assert_eq!(pid.page_no, 42);
/// assert_eq!(format!("{}", pid), "Page(1:42)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table_id: TableId,
    pub page_no: u32,
}

impl PageId {
    /// Create a new PageId.
    #[inline]
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        PageId { table_id, page_no }
    }

    /// Byte offset of this page within its table file.
    #[inline]
    pub fn offset(&self) -> u64 {
        (self.page_no as u64) * (crate::PAGE_SIZE as u64)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({}:{})", self.table_id, self.page_no)
    }
}
