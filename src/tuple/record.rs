//! Tuples and record ids.

use std::fmt;
use std::sync::Arc;

use crate::common::PageId;

use super::desc::TupleDesc;
use super::field::Field;

/// Storage location of one tuple: its page plus the slot within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: usize,
}

impl RecordId {
    #[inline]
    pub fn new(page_id: PageId, slot: usize) -> Self {
        RecordId { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot)
    }
}

/// A row: a schema, one value per column, and where it is stored (once it
/// has been inserted).
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Create an unstored tuple.
    pub fn new(desc: Arc<TupleDesc>, fields: Vec<Field>) -> Self {
        Self {
            desc,
            fields,
            record_id: None,
        }
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    /// Replace the value of column `i`.
    ///
    /// Returns `false` (and leaves the tuple untouched) if `i` is out of
    /// range.
    pub fn set_field(&mut self, i: usize, value: Field) -> bool {
        match self.fields.get_mut(i) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Cut every value down to what a page stores for it.
    pub fn fit_to_width(&mut self) {
        for field in &mut self.fields {
            field.fit_to_width();
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    /// True when every value has the type its column declares.
    pub fn matches_desc(&self, desc: &TupleDesc) -> bool {
        *self.desc == *desc
            && self.fields.len() == desc.num_fields()
            && self
                .fields
                .iter()
                .enumerate()
                .all(|(i, f)| desc.field_type(i) == Some(f.field_type()))
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
