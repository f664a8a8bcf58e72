//! Heap page - a fixed-size page of fixed-width tuple slots.
//!
//! A [`HeapPage`] is the decoded form of one `PAGE_SIZE` block of a heap
//! file. The decoded slots are the source of truth; the on-disk bytes are
//! produced on demand by [`HeapPage::page_data`].

use std::io;
use std::sync::Arc;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result, TransactionId};
use crate::tuple::{RecordId, Tuple, TupleDesc};

/// A page of tuples with a presence bitmap.
///
/// # Memory Layout
/// ```text
/// ┌──────────────────┬─────────┬─────────┬─────┬──────────┬───────────┐
/// │ header (bitmap)  │ slot 0  │ slot 1  │ ... │ slot N-1 │ zero tail │
/// │ ceil(N/8) bytes  │ tuple   │ tuple   │     │ tuple    │           │
/// └──────────────────┴─────────┴─────────┴─────┴──────────┴───────────┘
/// ```
///
/// Bit `i` of the header (byte `i / 8`, bit `i % 8`, LSB first) is set
/// exactly when slot `i` holds a live tuple. `N` is derived from the schema:
/// `N = floor(PAGE_SIZE * 8 / (tuple_size * 8 + 1))`.
///
/// # Dirty Tracking
/// The page remembers which transaction last modified it. The buffer pool
/// uses this to keep dirty pages resident (NO-STEAL) and to flush only the
/// committing transaction's pages.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    desc: Arc<TupleDesc>,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuple slots a page holds for the given schema.
    pub fn num_slots_for(desc: &TupleDesc) -> usize {
        (PAGE_SIZE * 8) / (desc.size() * 8 + 1)
    }

    /// Size of the presence bitmap in bytes for the given schema.
    pub fn header_size_for(desc: &TupleDesc) -> usize {
        Self::num_slots_for(desc).div_ceil(8)
    }

    /// Bytes of a freshly allocated page: every slot empty.
    pub fn create_empty_page_data() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    /// Decode a page from its on-disk bytes.
    ///
    /// # Errors
    /// Returns an `InvalidData` I/O error if `data` is not exactly
    /// `PAGE_SIZE` bytes long.
    pub fn new(pid: PageId, desc: Arc<TupleDesc>, data: &[u8]) -> Result<Self> {
        if data.len() != PAGE_SIZE {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} holds {} bytes, expected {}", pid, data.len(), PAGE_SIZE),
            )));
        }

        let num_slots = Self::num_slots_for(&desc);
        let header_size = num_slots.div_ceil(8);
        let tuple_size = desc.size();
        let mut header = data[..header_size].to_vec();
        // bits past the last slot name no tuple
        for bit in num_slots..header_size * 8 {
            header[bit / 8] &= !(1 << (bit % 8));
        }

        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                tuples.push(None);
                continue;
            }

            let mut offset = header_size + slot * tuple_size;
            let mut fields = Vec::with_capacity(desc.num_fields());
            for item in desc.items() {
                fields.push(item.field_type.parse(&data[offset..]));
                offset += item.field_type.size();
            }

            let mut tuple = Tuple::new(Arc::clone(&desc), fields);
            tuple.set_record_id(Some(RecordId::new(pid, slot)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            pid,
            desc,
            header,
            tuples,
            dirtier: None,
        })
    }

    /// Create an empty page without touching disk.
    pub fn empty(pid: PageId, desc: Arc<TupleDesc>) -> Self {
        let num_slots = Self::num_slots_for(&desc);
        Self {
            pid,
            header: vec![0u8; num_slots.div_ceil(8)],
            tuples: vec![None; num_slots],
            desc,
            dirtier: None,
        }
    }

    #[inline]
    pub fn id(&self) -> PageId {
        self.pid
    }

    #[inline]
    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    /// Encode the page into exactly `PAGE_SIZE` bytes.
    pub fn page_data(&self) -> Vec<u8> {
        let tuple_size = self.desc.size();
        let mut out = Vec::with_capacity(PAGE_SIZE);
        out.extend_from_slice(&self.header);

        for slot in &self.tuples {
            match slot {
                Some(tuple) => {
                    for field in tuple.fields() {
                        field.serialize_into(&mut out);
                    }
                }
                None => out.resize(out.len() + tuple_size, 0),
            }
        }

        out.resize(PAGE_SIZE, 0);
        out
    }

    // ========================================================================
    // Slot queries
    // ========================================================================

    #[inline]
    pub fn num_slots(&self) -> usize {
        self.tuples.len()
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots()).filter(|&i| !self.is_slot_used(i)).count()
    }

    /// Whether slot `i` holds a live tuple. Out-of-range slots are unused.
    pub fn is_slot_used(&self, i: usize) -> bool {
        i < self.num_slots() && self.header[i / 8] & (1 << (i % 8)) != 0
    }

    /// The tuple stored in slot `i`, if any.
    pub fn tuple_at(&self, i: usize) -> Option<&Tuple> {
        self.tuples.get(i).and_then(Option::as_ref)
    }

    /// First used slot at or after `from`.
    pub fn next_used_slot(&self, from: usize) -> Option<usize> {
        (from..self.num_slots()).find(|&i| self.is_slot_used(i))
    }

    /// Live tuples in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Store `tuple` in the first free slot and stamp its record id.
    ///
    /// String values longer than `STRING_LEN` bytes are cut in `tuple`
    /// itself before it is stored, so the caller holds exactly what the
    /// page (and later its bytes on disk) holds.
    ///
    /// # Errors
    /// - `Error::SchemaMismatch` if the tuple's shape differs from the page's
    /// - `Error::PageFull` if every slot is in use
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<RecordId> {
        if !tuple.matches_desc(&self.desc) {
            return Err(Error::SchemaMismatch {
                expected: self.desc.to_string(),
            });
        }

        let slot = self
            .next_free_slot()
            .ok_or(Error::PageFull(self.pid))?;

        let rid = RecordId::new(self.pid, slot);
        tuple.fit_to_width();
        tuple.set_record_id(Some(rid));
        self.tuples[slot] = Some(tuple.clone());
        self.set_slot(slot, true);

        Ok(rid)
    }

    /// Remove the tuple named by `tuple`'s record id.
    ///
    /// # Errors
    /// `Error::TupleNotFound` unless the record id points at this page, at an
    /// occupied slot, holding the same values.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<()> {
        let slot = match tuple.record_id() {
            Some(rid) if rid.page_id == self.pid => rid.slot,
            _ => return Err(Error::TupleNotFound(self.pid)),
        };

        match self.tuple_at(slot) {
            Some(stored) if stored.fields() == tuple.fields() => {}
            _ => return Err(Error::TupleNotFound(self.pid)),
        }

        self.tuples[slot] = None;
        self.set_slot(slot, false);
        Ok(())
    }

    // ========================================================================
    // Dirty flag
    // ========================================================================

    /// Mark the page dirtied by `tid`, or clean with `None`.
    #[inline]
    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtier = tid;
    }

    /// The transaction that last dirtied this page, if it is dirty.
    #[inline]
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    fn next_free_slot(&self) -> Option<usize> {
        (0..self.num_slots()).find(|&i| !self.is_slot_used(i))
    }

    fn set_slot(&mut self, i: usize, used: bool) {
        let mask = 1u8 << (i % 8);
        if used {
            self.header[i / 8] |= mask;
        } else {
            self.header[i / 8] &= !mask;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::STRING_LEN;
    use crate::common::TableId;
    use crate::tuple::{Field, Type};
    use proptest::prelude::*;

    fn int_desc(columns: usize) -> Arc<TupleDesc> {
        Arc::new(TupleDesc::new(vec![Type::Int; columns]))
    }

    fn pid(no: u32) -> PageId {
        PageId::new(TableId(11), no)
    }

    fn int_tuple(desc: &Arc<TupleDesc>, v: i32) -> Tuple {
        let fields = (0..desc.num_fields()).map(|i| Field::Int(v + i as i32)).collect();
        Tuple::new(Arc::clone(desc), fields)
    }

    #[test]
    fn test_slot_math() {
        // 24-byte tuples: floor(32768 / 193) = 169 slots, 22 header bytes
        let desc = int_desc(6);
        assert_eq!(HeapPage::num_slots_for(&desc), 169);
        assert_eq!(HeapPage::header_size_for(&desc), 22);

        // 8-byte tuples: floor(32768 / 65) = 504 slots, 63 header bytes
        let desc = int_desc(2);
        assert_eq!(HeapPage::num_slots_for(&desc), 504);
        assert_eq!(HeapPage::header_size_for(&desc), 63);
    }

    #[test]
    fn test_empty_page_data_decodes_empty() {
        let desc = int_desc(3);
        let page = HeapPage::new(pid(0), desc.clone(), &HeapPage::create_empty_page_data()).unwrap();

        assert_eq!(page.num_empty_slots(), HeapPage::num_slots_for(&desc));
        assert_eq!(page.iter().count(), 0);
        assert_eq!(page.page_data().len(), PAGE_SIZE);
        assert!(page.page_data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let result = HeapPage::new(pid(0), int_desc(1), &[0u8; 100]);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_insert_sets_bit_and_record_id() {
        let desc = int_desc(2);
        let mut page = HeapPage::empty(pid(4), desc.clone());
        let mut t = int_tuple(&desc, 10);

        let rid = page.insert_tuple(&mut t).unwrap();

        assert_eq!(rid, RecordId::new(pid(4), 0));
        assert_eq!(t.record_id(), Some(rid));
        assert!(page.is_slot_used(0));
        assert_eq!(page.page_data()[0], 0b0000_0001);
        assert_eq!(page.num_empty_slots(), page.num_slots() - 1);
    }

    #[test]
    fn test_insert_fills_lowest_free_slot() {
        let desc = int_desc(1);
        let mut page = HeapPage::empty(pid(0), desc.clone());
        let mut tuples: Vec<Tuple> = (0..3).map(|v| int_tuple(&desc, v)).collect();
        for t in tuples.iter_mut() {
            page.insert_tuple(t).unwrap();
        }

        page.delete_tuple(&tuples[1]).unwrap();
        let mut again = int_tuple(&desc, 99);
        let rid = page.insert_tuple(&mut again).unwrap();
        assert_eq!(rid.slot, 1);
    }

    #[test]
    fn test_insert_schema_mismatch() {
        let mut page = HeapPage::empty(pid(0), int_desc(2));
        let mut t = int_tuple(&int_desc(3), 1);
        assert!(matches!(
            page.insert_tuple(&mut t),
            Err(Error::SchemaMismatch { .. })
        ));
        assert_eq!(t.record_id(), None);
    }

    #[test]
    fn test_page_full() {
        let desc = int_desc(6);
        let mut page = HeapPage::empty(pid(0), desc.clone());

        for v in 0..169 {
            page.insert_tuple(&mut int_tuple(&desc, v)).unwrap();
        }
        assert_eq!(page.num_empty_slots(), 0);

        let result = page.insert_tuple(&mut int_tuple(&desc, 169));
        assert!(matches!(result, Err(Error::PageFull(p)) if p == pid(0)));
    }

    #[test]
    fn test_insert_then_delete_restores_empty_count() {
        let desc = int_desc(2);
        let mut page = HeapPage::empty(pid(0), desc.clone());
        page.insert_tuple(&mut int_tuple(&desc, 1)).unwrap();
        let before = page.num_empty_slots();

        let mut t = int_tuple(&desc, 2);
        page.insert_tuple(&mut t).unwrap();
        page.delete_tuple(&t).unwrap();

        assert_eq!(page.num_empty_slots(), before);
    }

    #[test]
    fn test_delete_missing_tuple() {
        let desc = int_desc(2);
        let mut page = HeapPage::empty(pid(0), desc.clone());

        // never inserted
        let t = int_tuple(&desc, 1);
        assert!(matches!(page.delete_tuple(&t), Err(Error::TupleNotFound(_))));

        // deleted twice
        let mut t = int_tuple(&desc, 1);
        page.insert_tuple(&mut t).unwrap();
        page.delete_tuple(&t).unwrap();
        assert!(matches!(page.delete_tuple(&t), Err(Error::TupleNotFound(_))));

        // record id on a different page
        let mut other = HeapPage::empty(pid(1), desc.clone());
        let mut t = int_tuple(&desc, 1);
        other.insert_tuple(&mut t).unwrap();
        page.insert_tuple(&mut int_tuple(&desc, 1)).unwrap();
        assert!(matches!(page.delete_tuple(&t), Err(Error::TupleNotFound(_))));
    }

    #[test]
    fn test_delete_rejects_stale_values() {
        let desc = int_desc(1);
        let mut page = HeapPage::empty(pid(0), desc.clone());
        let mut t = int_tuple(&desc, 1);
        page.insert_tuple(&mut t).unwrap();

        let mut stale = t.clone();
        assert!(stale.set_field(0, Field::Int(500)));
        assert!(matches!(page.delete_tuple(&stale), Err(Error::TupleNotFound(_))));
        assert!(page.is_slot_used(0));
    }

    #[test]
    fn test_iter_ascending_slot_order() {
        let desc = int_desc(1);
        let mut page = HeapPage::empty(pid(0), desc.clone());
        let mut tuples: Vec<Tuple> = (0..5).map(|v| int_tuple(&desc, v)).collect();
        for t in tuples.iter_mut() {
            page.insert_tuple(t).unwrap();
        }
        page.delete_tuple(&tuples[2]).unwrap();

        let values: Vec<Field> = page.iter().map(|t| t.fields()[0].clone()).collect();
        assert_eq!(
            values,
            vec![Field::Int(0), Field::Int(1), Field::Int(3), Field::Int(4)]
        );
        assert_eq!(page.next_used_slot(2), Some(3));
        assert_eq!(page.next_used_slot(5), None);
    }

    #[test]
    fn test_encode_decode_preserves_tuples() {
        let desc = Arc::new(TupleDesc::new(vec![Type::Int, Type::String]));
        let mut page = HeapPage::empty(pid(2), desc.clone());
        let mut t = Tuple::new(desc.clone(), vec![Field::Int(42), Field::from("answer")]);
        page.insert_tuple(&mut t).unwrap();

        let decoded = HeapPage::new(pid(2), desc, &page.page_data()).unwrap();
        assert_eq!(decoded.tuple_at(0), Some(&t));
        assert_eq!(decoded.page_data(), page.page_data());
    }

    #[test]
    fn test_dirty_flag() {
        let mut page = HeapPage::empty(pid(0), int_desc(1));
        assert!(!page.is_dirty());

        let tid = TransactionId::new();
        page.mark_dirty(Some(tid));
        assert_eq!(page.dirtier(), Some(tid));

        page.mark_dirty(None);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_long_string_is_stored_as_encoded() {
        let desc = Arc::new(TupleDesc::new(vec![Type::Int, Type::String]));
        let mut page = HeapPage::empty(pid(0), desc.clone());
        let mut t = Tuple::new(desc.clone(), vec![Field::Int(1), Field::String("x".repeat(200))]);

        page.insert_tuple(&mut t).unwrap();

        assert_eq!(t.field(1), Some(&Field::String("x".repeat(STRING_LEN))));
        let decoded = HeapPage::new(pid(0), desc, &page.page_data()).unwrap();
        assert_eq!(page.tuple_at(0), Some(&t));
        assert_eq!(decoded.tuple_at(0), Some(&t));

        // the caller's copy still deletes from the reloaded page
        let mut reloaded = decoded;
        reloaded.delete_tuple(&t).unwrap();
    }

    #[test]
    fn test_stray_header_bits_are_dropped() {
        // 169 slots end at bit 0 of byte 21; bits 1 to 7 of that byte are spare
        let desc = int_desc(6);
        let mut bytes = HeapPage::create_empty_page_data();
        bytes[21] = 0xFE;

        let page = HeapPage::new(pid(0), desc, &bytes).unwrap();
        assert_eq!(page.iter().count(), 0);
        assert!(page.page_data().iter().all(|&b| b == 0));
    }

    fn assert_same_slots(a: &HeapPage, b: &HeapPage) -> std::result::Result<(), TestCaseError> {
        prop_assert_eq!(a.num_slots(), b.num_slots());
        for slot in 0..a.num_slots() {
            prop_assert_eq!(a.tuple_at(slot), b.tuple_at(slot));
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_reencode_stably(
            bytes in proptest::collection::vec(any::<u8>(), PAGE_SIZE),
        ) {
            let desc = Arc::new(TupleDesc::new(vec![Type::Int, Type::String]));
            let once = HeapPage::new(pid(0), desc.clone(), &bytes).unwrap();
            let twice = HeapPage::new(pid(0), desc, &once.page_data()).unwrap();

            assert_same_slots(&once, &twice)?;
            prop_assert_eq!(once.page_data(), twice.page_data());
        }

        #[test]
        fn prop_stored_strings_match_their_encoding(
            strings in proptest::collection::vec(".{0,200}", 1..30),
        ) {
            let desc = Arc::new(TupleDesc::new(vec![Type::Int, Type::String]));
            let mut page = HeapPage::empty(pid(0), desc.clone());
            let mut inserted = Vec::new();
            for (i, s) in strings.into_iter().enumerate() {
                let mut t = Tuple::new(desc.clone(), vec![Field::Int(i as i32), Field::String(s)]);
                page.insert_tuple(&mut t).unwrap();
                inserted.push(t);
            }

            let decoded = HeapPage::new(pid(0), desc, &page.page_data()).unwrap();
            assert_same_slots(&page, &decoded)?;
            for t in &inserted {
                match t.field(1) {
                    Some(Field::String(s)) => prop_assert!(s.len() <= STRING_LEN),
                    other => prop_assert!(false, "unexpected field {:?}", other),
                }
                let slot = t.record_id().map(|rid| rid.slot);
                prop_assert_eq!(decoded.tuple_at(slot.unwrap_or(usize::MAX)), Some(t));
            }
        }

        #[test]
        fn prop_reencoding_is_idempotent(
            used in proptest::collection::vec(any::<bool>(), 504),
            values in proptest::collection::vec(any::<i32>(), 504),
        ) {
            let desc = int_desc(2);
            let mut page = HeapPage::empty(pid(0), desc.clone());
            let mut inserted = Vec::new();
            for (slot, v) in values.iter().enumerate() {
                let mut t = Tuple::new(desc.clone(), vec![Field::Int(*v), Field::Int(slot as i32)]);
                page.insert_tuple(&mut t).unwrap();
                inserted.push(t);
            }
            for (t, keep) in inserted.iter().zip(used.iter()) {
                if !keep {
                    page.delete_tuple(t).unwrap();
                }
            }

            let bytes = page.page_data();
            let once = HeapPage::new(pid(0), desc.clone(), &bytes).unwrap();
            let twice = HeapPage::new(pid(0), desc, &once.page_data()).unwrap();

            prop_assert_eq!(bytes.len(), PAGE_SIZE);
            prop_assert_eq!(once.page_data(), bytes);
            prop_assert_eq!(twice.iter().count(), used.iter().filter(|&&u| u).count());
            for (a, b) in once.iter().zip(twice.iter()) {
                prop_assert_eq!(a, b);
            }
        }
    }
}
