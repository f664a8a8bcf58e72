//! RAII transaction handle.

use tracing::{debug, warn};

use crate::buffer::BufferPool;
use crate::common::{Result, TransactionId};

/// A transaction running against one buffer pool.
///
/// Every page access made with [`id`](Self::id) takes part in strict
/// two-phase locking: locks accumulate until [`commit`](Self::commit) or
/// [`abort`](Self::abort). A handle dropped while still active is aborted.
pub struct Transaction<'a> {
    id: TransactionId,
    pool: &'a BufferPool,
    done: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(pool: &'a BufferPool) -> Self {
        let id = TransactionId::new();
        debug!(tid = %id, "transaction started");
        Self {
            id,
            pool,
            done: false,
        }
    }

    #[inline]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Flush every page this transaction dirtied, then release its locks.
    ///
    /// On error the transaction stays active and still holds its locks;
    /// dropping the handle will abort it.
    pub fn commit(mut self) -> Result<()> {
        self.pool.transaction_complete(self.id, true)?;
        self.done = true;
        Ok(())
    }

    /// Discard every page this transaction dirtied and release its locks.
    pub fn abort(mut self) -> Result<()> {
        self.done = true;
        self.pool.transaction_complete(self.id, false)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(e) = self.pool.transaction_complete(self.id, false) {
            warn!(tid = %self.id, error = %e, "failed to abort dropped transaction");
        }
    }
}
