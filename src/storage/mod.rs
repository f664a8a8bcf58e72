//! Storage layer - table files and page formats.
//!
//! This module handles persistent storage:
//! - [`HeapFile`] - One table's file of fixed-size pages
//! - [`page`] - The heap page slot format

mod heap_file;
pub mod page;

pub use heap_file::{HeapFile, HeapFileIter};
