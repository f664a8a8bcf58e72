//! heapdb - a page-oriented heap storage engine with strict two-phase locking.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Database                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │          Transactions (concurrency/)                     │   │
//! │  │      Transaction handle + LockManager (S/X, deadlocks)   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │          Buffer Pool (buffer/)                           │   │
//! │  │      BufferPool + LruCache + Statistics (NO-STEAL)       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │          Catalog (catalog.rs)                            │   │
//! │  │      TableId → HeapFile, name, primary key               │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │          Storage Layer (storage/)                        │   │
//! │  │      HeapFile + HeapPage (slotted pages, bitmap header)  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, TableId, TransactionId, Error, config)
//! - [`tuple`] - Field types, schemas and tuples
//! - [`storage`] - Heap files and the heap page format
//! - [`buffer`] - Buffer pool and LRU cache
//! - [`concurrency`] - Lock manager and transactions
//! - [`catalog`] - Table registry and schema loader
//! - [`database`] - The context object owning all of the above
//!
//! # Quick Start
//! ```no_run
//! use heapdb::storage::HeapFile;
//! use heapdb::tuple::{Field, Tuple, TupleDesc, Type};
//! use heapdb::{BufferPoolConfig, Database};
//!
//! let db = Database::new(BufferPoolConfig::new(16));
//! let desc = TupleDesc::with_names(vec![Type::Int, Type::Int], vec!["a", "b"]);
//! let table = db.catalog().add_table(HeapFile::open("pairs.dat", desc)?, "pairs", "a");
//!
//! let txn = db.begin();
//! let mut row = Tuple::new(db.catalog().tuple_desc(table)?, vec![Field::Int(1), Field::Int(2)]);
//! db.buffer_pool().insert_tuple(txn.id(), table, &mut row)?;
//! txn.commit()?;
//! # Ok::<(), heapdb::Error>(())
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod database;
pub mod storage;
pub mod tuple;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{BufferPoolConfig, Error, PageId, Result, TableId, TransactionId};

pub use buffer::{BufferPool, BufferPoolStats, PageRef, Permissions, StatsSnapshot};
pub use catalog::Catalog;
pub use concurrency::{LockManager, LockMode, Transaction};
pub use database::Database;
pub use storage::{HeapFile, HeapFileIter};
pub use tuple::{Field, RecordId, Tuple, TupleDesc, Type};
