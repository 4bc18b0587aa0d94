//! Module implement [SkipListIndex]: translation of an [IndexOperator]
//! tree into a set of [Interval]s over a [SkipList], and the cursor type
//! that walks them.

use std::cmp::Ordering;

use crate::element::{CompareFn, DocumentHandle, IndexElement};
use crate::error::{Error, Result};
use crate::iterator::{IndexIterator, Interval};
use crate::operator::{IndexOperator, OperatorKind};
use crate::skiplist::{list::Probability, node::NodeId, SkipList};

/// A probabilistic ordered index, consumed through `insert`/`remove`/`find`.
pub struct SkipListIndex<V> {
    list: SkipList<V>,
    arity: usize,
    sparse: bool,
}

impl<V: Clone + Send + Sync + 'static> SkipListIndex<V> {
    pub fn new(
        name: &str,
        unique: bool,
        arity: usize,
        sparse: bool,
        max_height: usize,
        probability: Probability,
        shaper: CompareFn<V>,
    ) -> Result<SkipListIndex<V>> {
        let list = SkipList::new(name, unique, max_height, probability, shaper)?;
        Ok(SkipListIndex { list, arity, sparse })
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn collect(&self, watermark: u64) -> Result<()> {
        self.list.collect(watermark)
    }

    /// Insert `element`. With `sparse`, an element whose `values` is
    /// shorter than the index's arity is silently accepted by the caller's
    /// collaborator before reaching here — this layer only validates the
    /// arity it was given.
    pub fn insert(&self, element: IndexElement<V>, tx_id: u64) -> Result<()> {
        if self.sparse && element.values.len() < self.arity {
            return err_at!(
                BadArity, msg: "sparse index skips element with {} of {} attributes",
                element.values.len(), self.arity
            );
        }
        if element.values.len() > self.arity {
            return err_at!(
                BadArity, msg: "element carries {} values, index arity is {}",
                element.values.len(), self.arity
            );
        }
        if self.list.is_unique() {
            self.list.insert_unique(element, tx_id)
        } else {
            self.list.insert_multi(element, tx_id)
        }
    }

    pub fn remove(
        &self,
        values: &[V],
        handle: Option<DocumentHandle>,
        tx_id: u64,
    ) -> Result<DocumentHandle> {
        self.list.remove(values, handle, tx_id)
    }

    /// Evaluate an operator tree, producing a cursor over its result set.
    pub fn find<'a>(
        &'a self,
        op: &IndexOperator<V>,
        tx_id: u64,
    ) -> Result<SkipListCursor<'a, V>> {
        let intervals = self.build_intervals(op, tx_id)?;
        let intervals = intervals
            .into_iter()
            .filter(|iv| self.list.next_node(iv.left) != iv.right)
            .collect();
        Ok(SkipListCursor::new(&self.list, intervals, tx_id))
    }

    fn build_intervals(&self, op: &IndexOperator<V>, tx_id: u64) -> Result<Vec<Interval<NodeId>>> {
        match op.kind {
            OperatorKind::And => {
                let (left, right) = (op.left.as_ref(), op.right.as_ref());
                let (left, right) = match (left, right) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return err_at!(BadParameter, msg: "And needs two children"),
                };
                let a = self.build_intervals(left, tx_id)?;
                let b = self.build_intervals(right, tx_id)?;
                Ok(self.intersect(a, b))
            }
            OperatorKind::Or => err_at!(Unsupported, msg: "Or is not supported by the skip-list index"),
            OperatorKind::Not => err_at!(Unsupported, msg: "Not is not supported by the skip-list index"),
            OperatorKind::Ne => err_at!(Unsupported, msg: "Ne is not supported by the skip-list index"),
            OperatorKind::In => {
                let mut out = Vec::with_capacity(op.params.len());
                for v in &op.params {
                    if let Some(iv) = self.eq_interval(std::slice::from_ref(v), tx_id) {
                        out.push(iv);
                    }
                }
                Ok(out)
            }
            OperatorKind::Eq => Ok(self.eq_interval(&op.params, tx_id).into_iter().collect()),
            OperatorKind::Lt => Ok(vec![self.lt_interval(&op.params, tx_id)]),
            OperatorKind::Le => Ok(vec![self.le_interval(&op.params, tx_id)]),
            OperatorKind::Gt => Ok(vec![self.gt_interval(&op.params, tx_id)]),
            OperatorKind::Ge => Ok(vec![self.ge_interval(&op.params, tx_id)]),
        }
    }

    fn eq_interval(&self, k: &[V], tx_id: u64) -> Option<Interval<NodeId>> {
        if k.len() == self.arity {
            let node = self.list.lookup_node(k, tx_id)?;
            Some(Interval::new(self.list.prev_node(node), self.list.next_node(node)))
        } else {
            let left = self.list.lookup_left(k, tx_id);
            let right = self.list.lookup_right(k, tx_id);
            Some(Interval::new(left, right))
        }
    }

    fn lt_interval(&self, k: &[V], tx_id: u64) -> Interval<NodeId> {
        let l = self.list.lookup_left(k, tx_id);
        Interval::new(self.list.head(), self.list.next_node(l))
    }

    fn le_interval(&self, k: &[V], tx_id: u64) -> Interval<NodeId> {
        let r = self.list.lookup_right(k, tx_id);
        Interval::new(self.list.head(), r)
    }

    fn gt_interval(&self, k: &[V], tx_id: u64) -> Interval<NodeId> {
        let r = self.list.lookup_right(k, tx_id);
        Interval::new(self.list.prev_node(r), self.list.tail())
    }

    fn ge_interval(&self, k: &[V], tx_id: u64) -> Interval<NodeId> {
        let l = self.list.lookup_left(k, tx_id);
        Interval::new(l, self.list.tail())
    }

    /// Intersect two interval sets: max of the left endpoints, min of the
    /// right endpoints. Both sides are expected to carry at most one
    /// interval in this implementation (no `Or`/`In` nested under `And`
    /// with more than one alternative surviving); extra entries are
    /// intersected pairwise, discarding empties.
    fn intersect(&self, a: Vec<Interval<NodeId>>, b: Vec<Interval<NodeId>>) -> Vec<Interval<NodeId>> {
        let mut out = Vec::new();
        for ia in &a {
            for ib in &b {
                let left = if self.list.cmp_boundary(ia.left, ib.left) == Ordering::Less {
                    ib.left
                } else {
                    ia.left
                };
                let right = if self.list.cmp_boundary(ia.right, ib.right) == Ordering::Greater {
                    ib.right
                } else {
                    ia.right
                };
                if self.list.cmp_boundary(left, right) == Ordering::Less {
                    out.push(Interval::new(left, right));
                }
            }
        }
        out
    }
}

/// Cursor over a [SkipListIndex]'s `find` result. Walks structural
/// neighbours (`next_node`/`prev_node`) and re-applies the MVCC visibility
/// filter at each step, since interval endpoints are structural positions
/// that may themselves be invisible.
pub struct SkipListCursor<'a, V> {
    list: &'a SkipList<V>,
    intervals: Vec<Interval<NodeId>>,
    tx_id: u64,
    /// `(interval index, last node visited within it)`; `None` once the
    /// cursor has been walked off either end.
    forward: Option<(usize, NodeId)>,
    backward: Option<(usize, NodeId)>,
}

impl<'a, V> SkipListCursor<'a, V> {
    fn new(list: &'a SkipList<V>, intervals: Vec<Interval<NodeId>>, tx_id: u64) -> Self {
        let forward = intervals.first().map(|iv| (0, iv.left));
        let backward = intervals.last().map(|iv| (intervals.len() - 1, iv.right));
        SkipListCursor { list, intervals, tx_id, forward, backward }
    }

    fn step_forward(&self, mut state: (usize, NodeId)) -> Option<(usize, NodeId, DocumentHandle)> {
        loop {
            let (idx, cur) = state;
            let iv = self.intervals.get(idx)?;
            let next = self.list.next_node(cur);
            if next == iv.right {
                match self.intervals.get(idx + 1) {
                    Some(next_iv) => {
                        state = (idx + 1, next_iv.left);
                        continue;
                    }
                    None => return None,
                }
            }
            if self.list.is_visible_at(next, self.tx_id) {
                let handle = self.list.element_at(next).expect("non-sentinel node").handle;
                return Some((idx, next, handle));
            }
            state = (idx, next);
        }
    }

    fn step_backward(&self, mut state: (usize, NodeId)) -> Option<(usize, NodeId, DocumentHandle)> {
        loop {
            let (idx, cur) = state;
            let iv = self.intervals.get(idx)?;
            let prev = self.list.prev_node(cur);
            if prev == iv.left {
                if idx == 0 {
                    return None;
                }
                let prev_iv = &self.intervals[idx - 1];
                state = (idx - 1, prev_iv.right);
                continue;
            }
            if self.list.is_visible_at(prev, self.tx_id) {
                let handle = self.list.element_at(prev).expect("non-sentinel node").handle;
                return Some((idx, prev, handle));
            }
            state = (idx, prev);
        }
    }
}

impl<'a, V> IndexIterator for SkipListCursor<'a, V> {
    type Item = DocumentHandle;

    fn has_next(&self) -> bool {
        match self.forward {
            Some(state) => self.step_forward(state).is_some(),
            None => false,
        }
    }

    fn has_prev(&self) -> bool {
        match self.backward {
            Some(state) => self.step_backward(state).is_some(),
            None => false,
        }
    }

    fn next(&mut self) -> Option<DocumentHandle> {
        let state = self.forward?;
        match self.step_forward(state) {
            Some((idx, node, handle)) => {
                self.forward = Some((idx, node));
                Some(handle)
            }
            None => {
                self.forward = None;
                None
            }
        }
    }

    fn prev(&mut self) -> Option<DocumentHandle> {
        let state = self.backward?;
        match self.step_backward(state) {
            Some((idx, node, handle)) => {
                self.backward = Some((idx, node));
                Some(handle)
            }
            None => {
                self.backward = None;
                None
            }
        }
    }

    fn reset(&mut self, to_beginning: bool) {
        if to_beginning {
            self.forward = self.intervals.first().map(|iv| (0, iv.left));
        } else {
            self.backward = self
                .intervals
                .last()
                .map(|iv| (self.intervals.len() - 1, iv.right));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{shaper_to_compare_fn, CollectionRef, NativeShaper};
    use crate::skiplist::MAX_HEIGHT;

    fn index() -> SkipListIndex<i64> {
        SkipListIndex::new(
            "test",
            true,
            1,
            false,
            MAX_HEIGHT,
            Probability::Half,
            shaper_to_compare_fn(NativeShaper::<i64>::new()),
        )
        .unwrap()
    }

    fn elem(handle: u64, key: i64) -> IndexElement<i64> {
        IndexElement::new(DocumentHandle(handle), vec![key], CollectionRef::new("docs"))
    }

    fn eq_op(k: i64) -> IndexOperator<i64> {
        let shaper: CompareFn<i64> = shaper_to_compare_fn(NativeShaper::<i64>::new());
        IndexOperator::relation(OperatorKind::Eq, vec![k], shaper, 1).unwrap()
    }

    #[test]
    fn test_unique_insert_and_find() {
        let idx = index();
        idx.insert(elem(1, 10), 1).unwrap();
        idx.insert(elem(2, 20), 2).unwrap();
        let err = idx.insert(elem(3, 10), 3).unwrap_err();
        assert!(matches!(err, Error::UniqueConstraintViolation(_)));

        let mut cur = idx.find(&eq_op(10), 3).unwrap();
        assert_eq!(cur.next(), Some(DocumentHandle(1)));
        assert_eq!(cur.next(), None);
    }

    #[test]
    fn test_range_and() {
        let idx = index();
        for k in 1..100i64 {
            idx.insert(elem(k as u64, k), 1).unwrap();
        }
        let shaper: CompareFn<i64> = shaper_to_compare_fn(NativeShaper::<i64>::new());
        let ge = IndexOperator::relation(OperatorKind::Ge, vec![30], shaper.clone(), 1).unwrap();
        let lt = IndexOperator::relation(OperatorKind::Lt, vec![40], shaper, 1).unwrap();
        let and = IndexOperator::logical(OperatorKind::And, ge, lt).unwrap();

        let mut cur = idx.find(&and, 2).unwrap();
        let mut got = Vec::new();
        while let Some(h) = cur.next() {
            got.push(h.0 as i64);
        }
        assert_eq!(got, (30..40).collect::<Vec<_>>());

        cur.reset(false);
        let mut got_rev = Vec::new();
        while let Some(h) = cur.prev() {
            got_rev.push(h.0 as i64);
        }
        assert_eq!(got_rev, (30..40).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_mvcc_find() {
        let idx = index();
        idx.insert(elem(1, 5), 1).unwrap();
        idx.remove(&[5], None, 3).unwrap();

        let mut before = idx.find(&eq_op(5), 2).unwrap();
        assert_eq!(before.next(), Some(DocumentHandle(1)));

        let mut after = idx.find(&eq_op(5), 4).unwrap();
        assert!(!after.has_next());
        assert_eq!(after.next(), None);
    }

    #[test]
    fn test_find_on_empty_index_is_empty() {
        let idx = index();
        let mut cur = idx.find(&eq_op(42), 1).unwrap();
        assert!(!cur.has_next());
        assert!(!cur.has_prev());
    }
}
