//! Error types for heapdb.

use thiserror::Error;

use crate::common::{PageId, TableId, TransactionId};

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors raised by the storage engine.
///
/// The variants fall into three groups:
/// - local conditions the caller can handle (`SchemaMismatch`, `PageFull`,
///   `TupleNotFound`, `PageNotFound`, `TableNotFound`, `InvalidSchema`,
///   `BufferFull`)
/// - transaction aborts (`Deadlock`, `LockTimeout`): the whole transaction
///   must be rolled back and restarted, not just the failed call
/// - `Io`: fatal to the current operation, never retried
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error against a table's backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tuple shape does not match the page or file schema.
    #[error("tuple schema does not match table schema ({expected})")]
    SchemaMismatch { expected: String },

    /// No free slot left on the page.
    #[error("{0} has no empty slot")]
    PageFull(PageId),

    /// Delete target is absent or already removed.
    #[error("tuple not found on {0}")]
    TupleNotFound(PageId),

    /// Every resident page is dirty, so nothing can be evicted.
    #[error("buffer pool is full: all {0} resident pages are dirty")]
    BufferFull(usize),

    /// Waiting for the lock would close a cycle in the wait-for graph.
    #[error("deadlock: {tid} aborted while waiting for {page_id}")]
    Deadlock {
        tid: TransactionId,
        page_id: PageId,
    },

    /// The lock could not be granted within the configured bound.
    #[error("{tid} aborted: lock wait on {page_id} timed out")]
    LockTimeout {
        tid: TransactionId,
        page_id: PageId,
    },

    /// Page does not exist in its table.
    #[error("{0} not found")]
    PageNotFound(PageId),

    /// Unknown table name or id.
    #[error("table {0} not found")]
    TableNotFound(String),

    /// Malformed catalog schema line.
    #[error("invalid catalog entry: {0}")]
    InvalidSchema(String),
}

impl Error {
    /// True when the error forces the owning transaction to abort.
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, Error::Deadlock { .. } | Error::LockTimeout { .. })
    }

    pub(crate) fn table_not_found(id: TableId) -> Self {
        Error::TableNotFound(id.to_string())
    }
}
