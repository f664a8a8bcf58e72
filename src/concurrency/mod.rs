//! Transactional concurrency control: page locks and transaction handles.

mod lock_manager;
mod transaction;

pub use lock_manager::{LockManager, LockMode};
pub use transaction::Transaction;
