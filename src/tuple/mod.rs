//! Schema and row types.
//!
//! - [`Type`] / [`Field`] - Fixed-width column types and values
//! - [`TupleDesc`] - A table schema
//! - [`Tuple`] / [`RecordId`] - A row and its storage location

mod desc;
mod field;
mod record;

pub use desc::{TdItem, TupleDesc};
pub use field::{Field, Type};
pub use record::{RecordId, Tuple};
