//! Database - the context object tying a catalog to a buffer pool.

use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::common::BufferPoolConfig;
use crate::concurrency::Transaction;

/// One catalog plus one buffer pool over it.
///
/// Several databases can live in one process; they share nothing except the
/// transaction id counter.
///
/// # Example
/// ```no_run
/// use heapdb::tuple::{Field, Tuple};
/// use heapdb::{BufferPoolConfig, Database};
///
/// let db = Database::new(BufferPoolConfig::default());
/// db.catalog().load_schema("data/catalog.txt")?;
/// let users = db.catalog().table_id("users")?;
///
/// let txn = db.begin();
/// let desc = db.catalog().tuple_desc(users)?;
/// let mut row = Tuple::new(desc, vec![Field::Int(1), Field::from("ada")]);
/// db.buffer_pool().insert_tuple(txn.id(), users, &mut row)?;
/// txn.commit()?;
/// # Ok::<(), heapdb::Error>(())
/// ```
pub struct Database {
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
}

impl Database {
    /// Create a database with an empty catalog.
    ///
    /// # Panics
    /// Panics if `config.num_pages` is 0.
    pub fn new(config: BufferPoolConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let buffer_pool = BufferPool::new(config, Arc::clone(&catalog));
        Self {
            catalog,
            buffer_pool,
        }
    }

    #[inline]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[inline]
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Start a new transaction.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(&self.buffer_pool)
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(BufferPoolConfig::default())
    }
}
