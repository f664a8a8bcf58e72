//! Page-level lock manager for strict two-phase locking.
//!
//! # Lock Compatibility Matrix
//!
//! ```text
//!          │ S  │ X  │
//! ─────────┼────┼────┤
//!     S    │ ✓  │ ✗  │
//!     X    │ ✗  │ ✗  │
//! ```
//!
//! A transaction that is the only holder of an S lock may upgrade it to X in
//! place. Asking again for a mode it already covers is a no-op.
//!
//! # Deadlocks
//!
//! A blocked request records wait-for edges from its transaction to every
//! conflicting holder. If those edges close a cycle the request fails with
//! [`Error::Deadlock`] immediately; otherwise it waits on a condition
//! variable that every release signals. A request still blocked after the
//! configured timeout fails with [`Error::LockTimeout`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::common::config::DEFAULT_LOCK_TIMEOUT;
use crate::common::{Error, PageId, Result, TransactionId};

/// Lock mode for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Read lock; any number of holders.
    Shared,
    /// Write lock; a single holder.
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "S"),
            LockMode::Exclusive => write!(f, "X"),
        }
    }
}

/// Lock state of one page.
#[derive(Debug)]
struct PageLock {
    mode: LockMode,
    holders: HashSet<TransactionId>,
}

#[derive(Debug, Default)]
struct LockTable {
    locks: HashMap<PageId, PageLock>,
    /// Pages locked by each transaction.
    held: HashMap<TransactionId, HashSet<PageId>>,
    /// Wait-for graph edges (waiter -> holders it is blocked on).
    waits_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl LockTable {
    /// Holders that prevent `tid` from getting `mode` on `pid`.
    /// Empty means the lock can be granted now.
    fn blockers(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> HashSet<TransactionId> {
        let Some(lock) = self.locks.get(&pid) else {
            return HashSet::new();
        };

        let compatible = match mode {
            LockMode::Shared => lock.mode == LockMode::Shared || lock.holders.contains(&tid),
            LockMode::Exclusive => lock.holders.iter().all(|&h| h == tid),
        };

        if compatible {
            HashSet::new()
        } else {
            lock.holders.iter().copied().filter(|&h| h != tid).collect()
        }
    }

    fn grant(&mut self, tid: TransactionId, pid: PageId, mode: LockMode) {
        let lock = self.locks.entry(pid).or_insert_with(|| PageLock {
            mode,
            holders: HashSet::new(),
        });
        if lock.holders.is_empty() || mode == LockMode::Exclusive {
            lock.mode = mode;
        }
        lock.holders.insert(tid);
        self.held.entry(tid).or_default().insert(pid);
    }

    fn release(&mut self, tid: TransactionId, pid: PageId) -> bool {
        let Some(lock) = self.locks.get_mut(&pid) else {
            return false;
        };
        let removed = lock.holders.remove(&tid);
        if lock.holders.is_empty() {
            self.locks.remove(&pid);
        }

        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&pid);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
        removed
    }

    /// Whether the wait-for graph has a path from `start` back to itself.
    fn has_cycle_from(&self, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<TransactionId> = self
            .waits_for
            .get(&start)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default();

        while let Some(tid) = stack.pop() {
            if tid == start {
                return true;
            }
            if visited.insert(tid) {
                if let Some(targets) = self.waits_for.get(&tid) {
                    stack.extend(targets.iter().copied());
                }
            }
        }
        false
    }

    fn forget_waiter(&mut self, tid: TransactionId) {
        self.waits_for.remove(&tid);
        for targets in self.waits_for.values_mut() {
            targets.remove(&tid);
        }
    }
}

/// Shared/exclusive page locks keyed by transaction.
///
/// # Thread Safety
/// The whole lock table sits behind one `Mutex`; blocked callers park on a
/// `Condvar` that is notified on every release, so no lock request spins.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    lock_timeout: Duration,
}

impl LockManager {
    /// Create a lock manager with the default wait bound.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create a lock manager whose requests give up after `lock_timeout`.
    pub fn with_timeout(lock_timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            lock_timeout,
        }
    }

    /// Acquire `mode` on `pid` for `tid`, blocking until it is compatible.
    ///
    /// # Errors
    /// - `Error::Deadlock` if waiting would close a wait-for cycle
    /// - `Error::LockTimeout` if the lock is not granted within the timeout
    ///
    /// Either way the caller must abort the whole transaction.
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> Result<()> {
        let deadline = Instant::now() + self.lock_timeout;
        let mut table = self.table.lock();

        loop {
            let blockers = table.blockers(tid, pid, mode);
            if blockers.is_empty() {
                table.forget_waiter(tid);
                table.grant(tid, pid, mode);
                return Ok(());
            }

            debug!(%tid, page = %pid, %mode, ?blockers, "lock request blocked");
            table.waits_for.insert(tid, blockers);

            if table.has_cycle_from(tid) {
                table.forget_waiter(tid);
                warn!(%tid, page = %pid, %mode, "deadlock detected, aborting requester");
                return Err(Error::Deadlock { tid, page_id: pid });
            }

            if Instant::now() >= deadline {
                table.forget_waiter(tid);
                warn!(%tid, page = %pid, %mode, "lock wait timed out");
                return Err(Error::LockTimeout { tid, page_id: pid });
            }

            self.released.wait_until(&mut table, deadline);
        }
    }

    /// Release one lock before the transaction completes.
    ///
    /// Breaks two-phase locking; only safe for pages the transaction did not
    /// read or write through this lock.
    pub fn release(&self, tid: TransactionId, pid: PageId) -> bool {
        let released = self.table.lock().release(tid, pid);
        if released {
            self.released.notify_all();
        }
        released
    }

    /// Release every lock held by `tid`. Returns how many were released.
    pub fn release_all(&self, tid: TransactionId) -> usize {
        let count = {
            let mut table = self.table.lock();
            let pages: Vec<PageId> = table
                .held
                .get(&tid)
                .map(|pages| pages.iter().copied().collect())
                .unwrap_or_default();
            for pid in &pages {
                table.release(tid, *pid);
            }
            table.forget_waiter(tid);
            pages.len()
        };

        self.released.notify_all();
        count
    }

    /// Whether `tid` holds any lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_mode(tid, pid).is_some()
    }

    /// The mode in which `tid` holds `pid`, if it does.
    pub fn lock_mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        let table = self.table.lock();
        table
            .locks
            .get(&pid)
            .filter(|lock| lock.holders.contains(&tid))
            .map(|lock| lock.mode)
    }

    /// Pages currently locked by `tid`.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        let mut pages: Vec<PageId> = table
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }

    /// The configured wait bound.
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
