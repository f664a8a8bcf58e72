//! Page formats.
//!
//! This module contains:
//! - [`HeapPage`] - A `PAGE_SIZE` block of fixed-width tuple slots with a
//!   presence bitmap

mod heap_page;

pub use heap_page::HeapPage;
