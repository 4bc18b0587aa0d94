//! Module implement the bitarray (bit-array) secondary index: `N`
//! one-hot columns of attribute-values plus a dedicated "undef" column,
//! addressed through a [MasterBlockTable].
//!
//! Grounded on the source's `bitarrayIndex.c` insert/remove/query
//! protocols; `bitarray.c`'s per-column word storage becomes one `u64`
//! per column per block here, which caps a single index at 64 total
//! one-hot columns (`BLOCKSIZE` bits of mask, §bitarray::master_table).

use std::collections::HashMap;

use crate::element::{CompareFn, DocumentHandle, IndexElement};
use crate::error::Result;
use crate::iterator::IndexIterator;
use crate::operator::{IndexOperator, OperatorKind};

use super::master_table::{MasterBlockTable, Slot, BLOCKSIZE};

/// A `(mask, ignore)` query pair. `ignore` marks columns to treat as
/// don't-care; equality is `(observed | ignore) == (mask | ignore)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BitMask {
    pub mask: u64,
    pub ignore: u64,
}

impl BitMask {
    pub fn new(mask: u64, ignore: u64) -> BitMask {
        BitMask { mask, ignore }
    }

    fn accepts(&self, observed: u64) -> bool {
        (observed | self.ignore) == (self.mask | self.ignore)
    }
}

/// One attribute's declared value list. `Some(v)` entries are matched by
/// equality; at most one `None` entry acts as that attribute's "other"
/// sentinel, matched when the element's value isn't any `Some(v)`.
pub type ValueList<V> = Vec<Option<V>>;

pub struct Bitarray<V> {
    value_lists: Vec<ValueList<V>>,
    column_offset: Vec<usize>,
    undef_column: usize,
    total_columns: usize,
    supports_undef: bool,
    shaper: CompareFn<V>,

    table: MasterBlockTable,
    columns: Vec<Vec<u64>>, // columns[col][block]
    by_handle: HashMap<DocumentHandle, Slot>,
}

impl<V: Clone> Bitarray<V> {
    pub fn new(
        value_lists: Vec<ValueList<V>>,
        supports_undef: bool,
        shaper: CompareFn<V>,
    ) -> Result<Bitarray<V>> {
        let mut column_offset = Vec::with_capacity(value_lists.len());
        let mut offset = 0;
        for list in &value_lists {
            column_offset.push(offset);
            offset += list.len();
        }
        let undef_column = offset;
        let total_columns = offset + 1;
        if total_columns > BLOCKSIZE {
            return err_at!(
                BadParameter, msg: "bitarray needs {} columns, at most {} supported",
                total_columns, BLOCKSIZE
            );
        }

        Ok(Bitarray {
            value_lists,
            column_offset,
            undef_column,
            total_columns,
            supports_undef,
            shaper,
            table: MasterBlockTable::new(),
            columns: vec![Vec::new(); total_columns],
            by_handle: HashMap::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    /// Compute the one-hot column set an element's values select, or
    /// `None` if the element must be rejected (no attribute matched, no
    /// sentinel present, and `supports_undef` is false).
    fn columns_for(&self, values: &[V]) -> Option<Vec<usize>> {
        let mut bits = Vec::new();
        let mut any_matched = false;
        for (j, list) in self.value_lists.iter().enumerate() {
            let v = values.get(j);
            let mut matched = None;
            if let Some(v) = v {
                for (i, candidate) in list.iter().enumerate() {
                    if let Some(c) = candidate {
                        if (self.shaper)(c, v) == std::cmp::Ordering::Equal {
                            matched = Some(i);
                            break;
                        }
                    }
                }
            }
            if matched.is_none() {
                matched = list.iter().position(|c| c.is_none());
            }
            match matched {
                Some(i) => {
                    bits.push(self.column_offset[j] + i);
                    any_matched = true;
                }
                None => {
                    if !self.supports_undef {
                        return None;
                    }
                }
            }
        }
        if !any_matched {
            if !self.supports_undef {
                return None;
            }
            bits.push(self.undef_column);
        }
        Some(bits)
    }

    pub fn insert(&mut self, element: IndexElement<V>, _tx_id: u64) -> Result<()> {
        let bits = match self.columns_for(&element.values) {
            Some(bits) => bits,
            None => return err_at!(BadParameter, msg: "element matches no column and supports_undef is false"),
        };

        let slot = self.table.alloc(element.handle);
        if slot.block >= self.columns[0].len() {
            for col in self.columns.iter_mut() {
                col.push(0);
            }
        }
        for col in bits {
            self.columns[col][slot.block] |= 1u64 << slot.bit;
        }
        self.by_handle.insert(element.handle, slot);
        Ok(())
    }

    pub fn remove(&mut self, handle: DocumentHandle) -> Result<()> {
        match self.by_handle.remove(&handle) {
            Some(slot) => {
                self.table.free(slot);
                Ok(())
            }
            None => err_at!(NotFound, msg: "no bitarray slot for {:?}", handle),
        }
    }

    fn observed_at(&self, slot: Slot) -> u64 {
        let mut v = 0u64;
        for (col, words) in self.columns.iter().enumerate() {
            if (words[slot.block] >> slot.bit) & 1 == 1 {
                v |= 1u64 << col;
            }
        }
        v
    }

    /// Query a single mask, or a mask set (OR of masks — first match per
    /// position wins). Not MVCC-visible: a freed slot is simply absent
    /// from `MasterBlockTable::iter_occupied`.
    pub fn find_masks(&self, masks: &[BitMask]) -> Vec<DocumentHandle> {
        let mut out = Vec::new();
        for slot in self.table.iter_occupied() {
            let observed = self.observed_at(slot);
            if masks.iter().any(|m| m.accepts(observed)) {
                if let Some(h) = self.table.handle_at(slot) {
                    out.push(h);
                }
            }
        }
        out
    }

    fn mask_for_eq(&self, params: &[V]) -> Option<BitMask> {
        let bits = self.columns_for(params)?;
        let mut covered = 0u64;
        for j in 0..params.len().min(self.value_lists.len()) {
            for i in 0..self.value_lists[j].len() {
                covered |= 1u64 << (self.column_offset[j] + i);
            }
        }
        if params.len() == self.value_lists.len() {
            covered |= 1u64 << self.undef_column;
        }
        let mask = bits.iter().fold(0u64, |acc, b| acc | (1u64 << b));
        let ignore = !covered & ((1u64 << self.total_columns) - 1);
        Some(BitMask::new(mask, ignore))
    }

    /// Translate an operator tree into a mask set. Only `Eq`, `In` (as a
    /// mask set) and `And` of `Eq`/`In` leaves are supported; anything
    /// else fails with `Unsupported`.
    pub fn to_mask_set(&self, op: &IndexOperator<V>) -> Result<Vec<BitMask>> {
        match op.kind {
            OperatorKind::Eq => match self.mask_for_eq(&op.params) {
                Some(m) => Ok(vec![m]),
                None => Ok(vec![]),
            },
            OperatorKind::In => {
                let mut out = Vec::with_capacity(op.params.len());
                for v in &op.params {
                    if let Some(m) = self.mask_for_eq(std::slice::from_ref(v)) {
                        out.push(m);
                    }
                }
                Ok(out)
            }
            OperatorKind::And => {
                let (l, r) = match (op.left.as_ref(), op.right.as_ref()) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return err_at!(BadParameter, msg: "And needs two children"),
                };
                let a = self.to_mask_set(l)?;
                let b = self.to_mask_set(r)?;
                let mut out = Vec::with_capacity(a.len() * b.len());
                for ma in &a {
                    for mb in &b {
                        out.push(BitMask::new(ma.mask | mb.mask, ma.ignore & mb.ignore));
                    }
                }
                Ok(out)
            }
            _ => err_at!(Unsupported, msg: "{:?} is not supported by the bitarray index", op.kind),
        }
    }

    pub fn find(&self, op: &IndexOperator<V>) -> Result<BitarrayCursor> {
        let masks = self.to_mask_set(op)?;
        Ok(BitarrayCursor::new(self.find_masks(&masks)))
    }
}

/// Result cursor over a bitarray query: a materialised handle list (the
/// scan itself is already a linear pass over occupied slots, so there is
/// no cheaper lazy representation).
pub struct BitarrayCursor {
    handles: Vec<DocumentHandle>,
    pos: Option<usize>,
}

impl BitarrayCursor {
    fn new(handles: Vec<DocumentHandle>) -> BitarrayCursor {
        BitarrayCursor { handles, pos: None }
    }
}

impl IndexIterator for BitarrayCursor {
    type Item = DocumentHandle;

    fn has_next(&self) -> bool {
        match self.pos {
            None => !self.handles.is_empty(),
            Some(i) => i + 1 < self.handles.len(),
        }
    }

    fn has_prev(&self) -> bool {
        match self.pos {
            None => false,
            Some(i) => i > 0,
        }
    }

    fn next(&mut self) -> Option<DocumentHandle> {
        let next = match self.pos {
            None if !self.handles.is_empty() => 0,
            None => return None,
            Some(i) if i + 1 < self.handles.len() => i + 1,
            Some(_) => return None,
        };
        self.pos = Some(next);
        Some(self.handles[next])
    }

    fn prev(&mut self) -> Option<DocumentHandle> {
        match self.pos {
            Some(0) | None => None,
            Some(i) => {
                self.pos = Some(i - 1);
                Some(self.handles[i - 1])
            }
        }
    }

    fn reset(&mut self, to_beginning: bool) {
        self.pos = if to_beginning {
            None
        } else {
            Some(self.handles.len())
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{shaper_to_compare_fn, CollectionRef, NativeShaper};

    fn bitarray() -> Bitarray<&'static str> {
        let shaper = shaper_to_compare_fn(NativeShaper::<&'static str>::new());
        Bitarray::new(
            vec![
                vec![Some("a"), Some("b"), Some("c")],
                vec![Some("x"), Some("y")],
            ],
            false,
            shaper,
        )
        .unwrap()
    }

    fn elem(h: u64, a: &'static str, b: &'static str) -> IndexElement<&'static str> {
        IndexElement::new(DocumentHandle(h), vec![a, b], CollectionRef::new("docs"))
    }

    #[test]
    fn test_equality_scenario() {
        let mut bi = bitarray();
        bi.insert(elem(1, "a", "y"), 1).unwrap();
        bi.insert(elem(2, "c", "x"), 2).unwrap();

        // attribute0 has no "other" sentinel, so H3 with an unrecognised
        // value for attribute0 is rejected unless supports_undef is set.
        let mut bi_undef = Bitarray::new(
            vec![vec![Some("a"), Some("b"), Some("c")], vec![Some("x"), Some("y")]],
            true,
            shaper_to_compare_fn(NativeShaper::<&'static str>::new()),
        )
        .unwrap();
        bi_undef.insert(elem(1, "a", "y"), 1).unwrap();
        bi_undef.insert(elem(2, "c", "x"), 2).unwrap();
        bi_undef.insert(elem(3, "unknown", "y"), 3).unwrap();

        let bit_a = 1u64 << 0;
        let bit_y = 1u64 << 4; // column offset: attr0 has 3 columns, attr1 starts at 3; y is index 1 -> col 4
        let got = bi.find_masks(&[BitMask::new(bit_a | bit_y, 0)]);
        assert_eq!(got, vec![DocumentHandle(1)]);

        // wildcard over every column: every occupied slot matches regardless
        // of which attribute values it carries.
        let wildcard = BitMask::new(0, u64::MAX);
        let mut got_undef = bi_undef.find_masks(&[wildcard]);
        got_undef.sort_by_key(|h| h.0);
        assert_eq!(got_undef, vec![DocumentHandle(1), DocumentHandle(2), DocumentHandle(3)]);
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut bi = bitarray();
        bi.insert(elem(1, "a", "x"), 1).unwrap();
        assert_eq!(bi.len(), 1);
        bi.remove(DocumentHandle(1)).unwrap();
        assert_eq!(bi.len(), 0);
        assert!(bi.find_masks(&[BitMask::new(0, u64::MAX)]).is_empty());
    }
}
