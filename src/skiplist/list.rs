//! Module implement the generic probabilistic ordered map: the 28% of
//! this crate that everything else (unique/multi index, garbage
//! collector) is built on top of.

use std::{cmp::Ordering, sync::Arc};

use rand::Rng;

use crate::element::{CompareFn, IndexElement};
use crate::error::{Error, Result};
use crate::skiplist::arena::Arena;
use crate::skiplist::gc::GarbageCollector;
use crate::skiplist::node::{Node, NodeId, TowerState, NIL};
use crate::util::Spinlock;

pub const MAX_HEIGHT: usize = 100;

/// Probability parameter for the geometric height distribution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Probability {
    Half,
    Third,
    Quarter,
}

impl Probability {
    fn p(self) -> f64 {
        match self {
            Probability::Half => 0.5,
            Probability::Third => 1.0 / 3.0,
            Probability::Quarter => 0.25,
        }
    }
}

fn random_height(max_height: usize, prob: Probability) -> usize {
    let mut rng = rand::thread_rng();
    let threshold = prob.p();
    let mut h = 1;
    while h < max_height && rng.gen::<f64>() < threshold {
        h += 1;
    }
    h
}

/// Compare a (possibly partial) probe key against a stored key, element by
/// element, using the caller's attribute shaper.
///
/// When `probe` is a strict prefix of `stored` (the usual case for a
/// range-bound lookup with fewer attributes than the index's arity), the
/// `direction` hint breaks the tie: `direction < 0` makes the probe sort
/// before every key sharing that prefix (used to find the left exclusive
/// bound of a `Ge`/`Gt`), `direction > 0` makes it sort after them (used
/// for the right exclusive bound of `Lt`/`Le`).
pub fn compare_keys<V>(probe: &[V], stored: &[V], direction: i8, shaper: &CompareFn<V>) -> Ordering {
    let n = probe.len().min(stored.len());
    for i in 0..n {
        let o = shaper(&probe[i], &stored[i]);
        if o != Ordering::Equal {
            return o;
        }
    }
    match probe.len().cmp(&stored.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Less if direction < 0 => Ordering::Less,
        Ordering::Less => Ordering::Greater,
        Ordering::Greater if direction < 0 => Ordering::Greater,
        Ordering::Greater => Ordering::Less,
    }
}

struct Inner {
    head: NodeId,
    tail: NodeId,
    height: usize,
}

/// A probabilistic ordered map from a tuple of attribute values to an
/// [IndexElement], carrying per-node insert/delete transaction stamps.
///
/// Mutating calls (`insert_unique`, `insert_multi`, `remove`) assume the
/// surrounding transaction layer serialises writers; any number of reader
/// threads may call the lookup methods concurrently with a writer. That
/// contract is enforced here by a coarse [Spinlock]: readers hold its
/// shared latch, the single writer holds its exclusive one.
pub struct SkipList<V> {
    arena: Arc<Spinlock<Arena<V>>>,
    inner: Spinlock<Inner>,
    gc: GarbageCollector<V>,
    max_height: usize,
    probability: Probability,
    shaper: CompareFn<V>,
    unique: bool,
}

impl<V: Clone + Send + Sync + 'static> SkipList<V> {
    pub fn new(
        name: &str,
        unique: bool,
        max_height: usize,
        probability: Probability,
        shaper: CompareFn<V>,
    ) -> Result<SkipList<V>> {
        if max_height == 0 || max_height > MAX_HEIGHT {
            return err_at!(BadParameter, msg: "max_height {} outside 1..={}", max_height, MAX_HEIGHT);
        }

        let mut arena = Arena::new();
        let head = arena.alloc(Node::sentinel(1));
        let tail = arena.alloc(Node::sentinel(1));
        arena.get_mut(head).column[0] = (NIL, tail);
        arena.get_mut(tail).column[0] = (head, NIL);

        let arena = Arc::new(Spinlock::new(arena));
        let gc = GarbageCollector::new(Arc::clone(&arena), &format!("{}-gc", name));

        Ok(SkipList {
            arena,
            inner: Spinlock::new(Inner { head, tail, height: 1 }),
            gc,
            max_height,
            probability,
            shaper,
            unique,
        })
    }

    pub fn len(&self) -> usize {
        self.arena.read().len().saturating_sub(2) // minus head/tail sentinels
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Let the garbage collector drain jobs that are now behind the
    /// watermark. Call whenever the surrounding transaction context's set
    /// of active readers changes.
    pub fn collect(&self, watermark: u64) -> Result<()> {
        self.gc.tick(watermark)
    }

    fn grow_to(&self, inner: &mut Inner, height: usize) {
        let mut arena = self.arena.write();
        while inner.height < height {
            let level = inner.height;
            arena.get_mut(inner.head).column.push((NIL, inner.tail));
            arena.get_mut(inner.tail).column.push((inner.head, NIL));
            debug_assert_eq!(arena.get(inner.head).column.len() - 1, level);
            inner.height += 1;
        }
    }

    /// Descend from head at the current active height, returning the
    /// predecessor chain (one entry per level, `0..height`) and the
    /// structurally-first node whose key is `>= probe` under `direction`.
    fn descend(
        &self,
        arena: &Arena<V>,
        inner: &Inner,
        probe: &[V],
        direction: i8,
    ) -> (Vec<NodeId>, NodeId) {
        let mut preds = vec![inner.head; inner.height];
        let mut cur = inner.head;
        for level in (0..inner.height).rev() {
            loop {
                let next = arena.get(cur).column[level].1;
                if next == inner.tail {
                    break;
                }
                let next_keys = arena.get(next).keys().expect("non-sentinel node");
                if compare_keys(next_keys, probe, -direction, &self.shaper) == Ordering::Less {
                    cur = next;
                } else {
                    break;
                }
            }
            preds[level] = cur;
        }
        let candidate = arena.get(cur).column[0].1;
        (preds, candidate)
    }

    /// Exact match, visible at `tx_id`.
    pub fn lookup_key(&self, probe: &[V], tx_id: u64) -> Option<IndexElement<V>> {
        let arena = self.arena.read();
        let inner = self.inner.read();
        let (_, mut cur) = self.descend(&arena, &inner, probe, 0);
        while cur != inner.tail {
            let node = arena.get(cur);
            let keys = node.keys().expect("non-sentinel node");
            if compare_keys(keys, probe, 0, &self.shaper) != Ordering::Equal {
                break;
            }
            if node.visible_at(tx_id) {
                return node.element.clone();
            }
            cur = node.column[0].1;
        }
        None
    }

    /// Like [SkipList::lookup_key], but returns the node id rather than a
    /// cloned element — used by `find` to build the exclusive-endpoint
    /// interval around a full-arity `Eq` match.
    pub fn lookup_node(&self, probe: &[V], tx_id: u64) -> Option<NodeId> {
        let arena = self.arena.read();
        let inner = self.inner.read();
        let (_, mut cur) = self.descend(&arena, &inner, probe, 0);
        while cur != inner.tail {
            let node = arena.get(cur);
            let keys = node.keys().expect("non-sentinel node");
            if compare_keys(keys, probe, 0, &self.shaper) != Ordering::Equal {
                break;
            }
            if node.visible_at(tx_id) {
                return Some(cur);
            }
            cur = node.column[0].1;
        }
        None
    }

    /// Order two boundary node ids (sentinels included) by key. Used to
    /// intersect the interval sets of an `And`'s two children.
    pub fn cmp_boundary(&self, a: NodeId, b: NodeId) -> Ordering {
        let inner = self.inner.read();
        if a == b {
            return Ordering::Equal;
        }
        if a == inner.head {
            return Ordering::Less;
        }
        if b == inner.head {
            return Ordering::Greater;
        }
        if a == inner.tail {
            return Ordering::Greater;
        }
        if b == inner.tail {
            return Ordering::Less;
        }
        let arena = self.arena.read();
        let ak = arena.get(a).keys().expect("non-sentinel node");
        let bk = arena.get(b).keys().expect("non-sentinel node");
        compare_keys(ak, bk, 0, &self.shaper)
    }

    /// Greatest node strictly less than `probe`, visible at `tx_id`; `NIL`
    /// sentinel (head) if none.
    pub fn lookup_left(&self, probe: &[V], tx_id: u64) -> NodeId {
        let arena = self.arena.read();
        let inner = self.inner.read();
        let (preds, _) = self.descend(&arena, &inner, probe, -1);
        let mut cur = preds[0];
        while cur != inner.head && !arena.get(cur).visible_at(tx_id) {
            cur = arena.get(cur).column[0].0;
        }
        cur
    }

    /// Least node strictly greater than `probe`, visible at `tx_id`; the
    /// tail sentinel if none.
    pub fn lookup_right(&self, probe: &[V], tx_id: u64) -> NodeId {
        let arena = self.arena.read();
        let inner = self.inner.read();
        let (_, mut cur) = self.descend(&arena, &inner, probe, 1);
        while cur != inner.tail {
            let node = arena.get(cur);
            let keys = node.keys().expect("non-sentinel node");
            let is_strictly_greater = compare_keys(keys, probe, 1, &self.shaper) == Ordering::Greater;
            if is_strictly_greater && node.visible_at(tx_id) {
                break;
            }
            cur = node.column[0].1;
        }
        cur
    }

    /// Raw, un-filtered step forward at level 0. The MVCC visibility
    /// filter is applied by the iterator, not here.
    pub fn next_node(&self, n: NodeId) -> NodeId {
        self.arena.read().get(n).column[0].1
    }

    /// Raw, un-filtered step backward at level 0.
    pub fn prev_node(&self, n: NodeId) -> NodeId {
        self.arena.read().get(n).column[0].0
    }

    pub fn head(&self) -> NodeId {
        self.inner.read().head
    }

    pub fn tail(&self) -> NodeId {
        self.inner.read().tail
    }

    pub fn element_at(&self, n: NodeId) -> Option<IndexElement<V>> {
        self.arena.read().get(n).element.clone()
    }

    pub fn is_visible_at(&self, n: NodeId, tx_id: u64) -> bool {
        self.arena.read().get(n).visible_at(tx_id)
    }

    pub fn is_sentinel(&self, n: NodeId) -> bool {
        let inner = self.inner.read();
        n == inner.head || n == inner.tail
    }

    fn splice_in(&self, arena: &mut Arena<V>, preds: &[NodeId], node_id: NodeId) {
        let height = arena.get(node_id).height();
        for level in 0..height {
            let succ = arena.get(preds[level]).column[level].1;
            arena.get_mut(node_id).column[level] = (preds[level], succ);
            arena.get_mut(preds[level]).column[level].1 = node_id;
            arena.get_mut(succ).column[level].0 = node_id;
        }
        arena.get_mut(node_id).state = TowerState::Stable;
    }

    /// Insert into a unique index. Fails with `UniqueConstraintViolation`
    /// if a currently-visible node already carries this key. A key whose
    /// only occupant is ghosted (`deleted_by <= tx_id`) is treated as
    /// "strictly greater" for positioning purposes and a brand new node is
    /// always allocated — matching the source's conservative behaviour of
    /// never resurrecting a ghost in place.
    pub fn insert_unique(
        &self,
        element: IndexElement<V>,
        tx_id: u64,
    ) -> Result<()> {
        assert!(self.unique, "insert_unique called on a multi-valued skip list");
        let probe = element.values.clone();

        let h = random_height(self.max_height, self.probability);
        let mut inner = self.inner.write();
        self.grow_to(&mut inner, h);

        let mut arena = self.arena.write();
        let (preds, candidate) = self.descend(&arena, &inner, &probe, 0);

        if candidate != inner.tail {
            let node = arena.get(candidate);
            let keys = node.keys().expect("non-sentinel node");
            if compare_keys(keys, &probe, 0, &self.shaper) == Ordering::Equal
                && node.visible_at(tx_id)
            {
                return err_at!(
                    UniqueConstraintViolation, msg: "key already present for {:?}", element.handle
                );
            }
        }

        let node_id = arena.alloc(Node::new(element, h, tx_id));
        self.splice_in(&mut arena, &preds, node_id);
        Ok(())
    }

    /// Insert into a multi-valued index. Duplicate keys are permitted;
    /// only an element-identical duplicate (same key and same document
    /// handle, still visible) fails with `DuplicateItem`.
    pub fn insert_multi(&self, element: IndexElement<V>, tx_id: u64) -> Result<()> {
        assert!(!self.unique, "insert_multi called on a unique skip list");
        let probe = element.values.clone();

        let h = random_height(self.max_height, self.probability);
        let mut inner = self.inner.write();
        self.grow_to(&mut inner, h);

        let mut arena = self.arena.write();
        let (preds, mut cur) = self.descend(&arena, &inner, &probe, 0);

        while cur != inner.tail {
            let node = arena.get(cur);
            let keys = node.keys().expect("non-sentinel node");
            if compare_keys(keys, &probe, 0, &self.shaper) != Ordering::Equal {
                break;
            }
            let same_handle = node.element.as_ref().map(|e| e.handle) == Some(element.handle);
            if same_handle && node.visible_at(tx_id) {
                return err_at!(
                    DuplicateItem, msg: "element-identical entry for {:?}", element.handle
                );
            }
            cur = node.column[0].1;
        }

        let node_id = arena.alloc(Node::new(element, h, tx_id));
        self.splice_in(&mut arena, &preds, node_id);
        Ok(())
    }

    /// Locate the node carrying `probe` (and, for a multi-valued index,
    /// matching `handle` too), visible at `tx_id`.
    fn locate(&self, arena: &Arena<V>, inner: &Inner, probe: &[V], handle: Option<crate::DocumentHandle>, tx_id: u64) -> Option<NodeId> {
        let (_, mut cur) = self.descend(arena, inner, probe, 0);
        while cur != inner.tail {
            let node = arena.get(cur);
            let keys = node.keys().expect("non-sentinel node");
            if compare_keys(keys, probe, 0, &self.shaper) != Ordering::Equal {
                break;
            }
            let handle_ok = match handle {
                Some(h) => node.element.as_ref().map(|e| e.handle) == Some(h),
                None => true,
            };
            if handle_ok && node.visible_at(tx_id) {
                return Some(cur);
            }
            cur = node.column[0].1;
        }
        None
    }

    /// Remove the element carrying `values` (and, for a multi-valued
    /// index, `handle`). Stamps `deleted_by` only — the node's tower links
    /// are left intact so that `descend` (and therefore `lookup_key` at an
    /// earlier `tx_id`) can still reach it — and hands it to the garbage
    /// collector, which physically unlinks and frees it only once no
    /// active reader can still observe it (§4.6). The index is left
    /// structurally unchanged on `NotFound`.
    pub fn remove(
        &self,
        values: &[V],
        handle: Option<crate::DocumentHandle>,
        tx_id: u64,
    ) -> Result<crate::DocumentHandle> {
        let inner = self.inner.write();
        let mut arena = self.arena.write();

        let node_id = match self.locate(&arena, &inner, values, handle, tx_id) {
            Some(id) => id,
            None => return err_at!(NotFound, msg: "no visible element for {:?}", values),
        };

        arena.get_mut(node_id).deleted_by = tx_id;

        let removed_handle = arena.get(node_id).element.as_ref().unwrap().handle;
        self.gc.enqueue(node_id)?;
        Ok(removed_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{shaper_to_compare_fn, NativeShaper};
    use crate::CollectionRef;
    use crate::DocumentHandle;

    fn list() -> SkipList<i64> {
        SkipList::new(
            "test",
            true,
            MAX_HEIGHT,
            Probability::Half,
            shaper_to_compare_fn(NativeShaper::<i64>::new()),
        )
        .unwrap()
    }

    fn elem(handle: u64, key: i64) -> IndexElement<i64> {
        IndexElement::new(DocumentHandle(handle), vec![key], CollectionRef::new("docs"))
    }

    #[test]
    fn test_unique_insert_and_duplicate() {
        let sl = list();
        sl.insert_unique(elem(1, 10), 1).unwrap();
        sl.insert_unique(elem(2, 20), 2).unwrap();
        let err = sl.insert_unique(elem(3, 10), 3).unwrap_err();
        assert!(matches!(err, Error::UniqueConstraintViolation(_)));

        let found = sl.lookup_key(&[10], 3).unwrap();
        assert_eq!(found.handle, DocumentHandle(1));
    }

    #[test]
    fn test_mvcc_visibility() {
        let sl = list();
        sl.insert_unique(elem(1, 5), 1).unwrap();
        assert!(sl.lookup_key(&[5], 2).is_some());
        sl.remove(&[5], None, 3).unwrap();
        assert!(sl.lookup_key(&[5], 2).is_some());
        assert!(sl.lookup_key(&[5], 4).is_none());
    }

    #[test]
    fn test_range_order() {
        let sl = list();
        for k in 1..100 {
            sl.insert_unique(elem(k as u64, k), 1).unwrap();
        }
        let left = sl.lookup_left(&[30], 2);
        let mut cur = sl.next_node(left);
        let mut seen = vec![];
        while !sl.is_sentinel(cur) {
            let e = sl.element_at(cur).unwrap();
            if e.values[0] >= 40 {
                break;
            }
            seen.push(e.values[0]);
            cur = sl.next_node(cur);
        }
        assert_eq!(seen, (30..40).collect::<Vec<_>>());
    }
}
