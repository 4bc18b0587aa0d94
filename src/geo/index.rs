//! Module implement [GeoIndex]: a Hilbert-linearised, AVL-balanced tree
//! over points on a sphere, supporting radius and nearest-k queries.
//!
//! Grounded on the source's `GeoIndex_insert`/`GeoIndex_remove`/
//! `GeoIndex_PointsWithinRadius`/`GeoIndex_NearestCount`. Pot ids are
//! kept stable across rotation and split/merge by swapping *content*
//! between two arena slots rather than re-pointing a parent's child
//! fields — the parent never needs to learn a new child id.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::element::DocumentHandle;
use crate::error::Result;
use crate::geo::distance::{embed, meters_to_snmd, snmd, snmd_to_meters, FixedPointSet, Point3};
use crate::geo::hilbert;
use crate::geo::pot::{Pot, PotArena, PotId, Slot, SlotArena, SlotId, POTSIZE};
use crate::iterator::IndexIterator;

pub struct GeoIndex {
    pots: PotArena,
    slots: SlotArena,
    root: PotId,
    refs: Vec<Point3>,
    len: usize,
}

impl GeoIndex {
    pub fn new(fixed_point_set: FixedPointSet) -> GeoIndex {
        let refs = fixed_point_set.points();
        let mut pots = PotArena::new();
        let root = pots.alloc(Pot::leaf(0, u64::MAX, refs.len()));
        GeoIndex { pots, slots: SlotArena::new(), root, refs, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// No-op in the source; preserved as a no-op here too.
    pub fn hint(&self) {}

    fn descend(&self, hilbert: u64) -> Vec<PotId> {
        let mut path = vec![self.root];
        let mut cur = self.root;
        while let Some((l, r)) = self.pots.get(cur).children {
            cur = if hilbert < self.pots.get(cur).middle { l } else { r };
            path.push(cur);
        }
        path
    }

    pub fn insert(&mut self, lat: f64, lon: f64, handle: DocumentHandle) -> Result<()> {
        if !(-90.0..=90.0).contains(&lat) {
            return err_at!(InvalidCoordinate, msg: "latitude {} outside [-90, 90]", lat);
        }
        if !(-180.0..=180.0).contains(&lon) {
            return err_at!(InvalidCoordinate, msg: "longitude {} outside [-180, 180]", lon);
        }

        let hv = hilbert::encode(lat, lon);
        let embedding = embed(lat, lon);
        let slot_id = self.slots.alloc(Slot { lat, lon, handle, hilbert: hv, embedding });

        let path = self.descend(hv);
        let leaf = *path.last().unwrap();

        let mut ids = self.pots.get(leaf).slots.clone();
        ids.push(slot_id);
        ids.sort_by_key(|id| self.slots.get(*id).hilbert);

        if ids.len() <= POTSIZE {
            self.pots.get_mut(leaf).slots = ids;
        } else {
            self.split_leaf(leaf, ids);
        }

        self.maintain_path(&path);
        self.len += 1;
        Ok(())
    }

    fn split_leaf(&mut self, leaf: PotId, ids: Vec<SlotId>) {
        let mid = ids.len() / 2;
        let left_ids = ids[..mid].to_vec();
        let right_ids = ids[mid..].to_vec();

        let start = self.pots.get(leaf).start;
        let end = self.pots.get(leaf).end;
        let middle = self.slots.get(right_ids[0]).hilbert;
        let num_refs = self.refs.len();

        let mut left_pot = Pot::leaf(start, middle, num_refs);
        left_pot.slots = left_ids;
        let mut right_pot = Pot::leaf(middle, end, num_refs);
        right_pot.slots = right_ids;

        let left_id = self.pots.alloc(left_pot);
        let right_id = self.pots.alloc(right_pot);
        self.recompute_node_maxdist(left_id);
        self.recompute_node_maxdist(right_id);

        let node = self.pots.get_mut(leaf);
        node.children = Some((left_id, right_id));
        node.middle = middle;
        node.slots.clear();
        node.level = 1;
    }

    /// Bottom-up: refresh `maxdist` from current children, then (for
    /// internal nodes) restore the AVL height property, rotating when a
    /// child pair differs by more than one level.
    fn maintain_path(&mut self, path: &[PotId]) {
        for &id in path.iter().rev() {
            self.recompute_node_maxdist(id);
            if self.pots.get(id).children.is_some() {
                self.fix_node(id);
            }
        }
    }

    fn recompute_node_maxdist(&mut self, id: PotId) {
        let num_refs = self.refs.len();
        let maxdist = match self.pots.get(id).children {
            None => {
                let mut m = vec![0.0f64; num_refs];
                for &sid in &self.pots.get(id).slots {
                    let emb = self.slots.get(sid).embedding;
                    for (r, &refpt) in self.refs.iter().enumerate() {
                        let d = snmd(emb, refpt);
                        if d > m[r] {
                            m[r] = d;
                        }
                    }
                }
                m
            }
            Some((l, r)) => (0..num_refs)
                .map(|i| self.pots.get(l).maxdist[i].max(self.pots.get(r).maxdist[i]))
                .collect(),
        };
        self.pots.get_mut(id).maxdist = maxdist;
    }

    fn fix_level(&mut self, id: PotId) {
        let (l, r) = self.pots.get(id).children.unwrap();
        let level = self.pots.get(l).level.max(self.pots.get(r).level) + 1;
        self.pots.get_mut(id).level = level;
    }

    fn fix_node(&mut self, id: PotId) {
        let (l, r) = self.pots.get(id).children.unwrap();
        let ll = self.pots.get(l).level as i32;
        let rl = self.pots.get(r).level as i32;
        if (ll - rl).abs() <= 1 {
            self.fix_level(id);
            return;
        }
        if ll > rl {
            self.rotate_right(id);
        } else {
            self.rotate_left(id);
        }
    }

    /// `x`'s left child `y` is over-heavy. Swap content between `x` and
    /// `y` so `x` keeps its id as the new subtree root — no grandparent
    /// pointer ever needs to change.
    fn rotate_right(&mut self, x: PotId) {
        let (y, z) = self.pots.get(x).children.unwrap();
        let (yl, yr) = self.pots.get(y).children.unwrap();
        if self.pots.get(yl).level < self.pots.get(yr).level {
            self.rotate_left(y);
        }
        let (yl, yr) = self.pots.get(y).children.unwrap();

        let y_start = self.pots.get(y).start;
        let y_middle = self.pots.get(y).middle;
        let x_end = self.pots.get(x).end;
        let x_middle = self.pots.get(x).middle;

        {
            let node = self.pots.get_mut(y);
            node.children = Some((yr, z));
            node.start = y_middle;
            node.end = x_end;
            node.middle = x_middle;
        }
        {
            let node = self.pots.get_mut(x);
            node.children = Some((yl, y));
            node.start = y_start;
            node.end = x_end;
            node.middle = y_middle;
        }

        self.recompute_node_maxdist(y);
        self.fix_level(y);
        self.recompute_node_maxdist(x);
        self.fix_level(x);
    }

    /// Mirror of [GeoIndex::rotate_right] for a right-heavy `x`.
    fn rotate_left(&mut self, x: PotId) {
        let (y, z) = self.pots.get(x).children.unwrap();
        let (zl, zr) = self.pots.get(z).children.unwrap();
        if self.pots.get(zr).level < self.pots.get(zl).level {
            self.rotate_right(z);
        }
        let (zl, zr) = self.pots.get(z).children.unwrap();

        let x_start = self.pots.get(x).start;
        let x_middle = self.pots.get(x).middle;
        let z_middle = self.pots.get(z).middle;
        let z_end = self.pots.get(z).end;

        {
            let node = self.pots.get_mut(z);
            node.children = Some((y, zl));
            node.start = x_start;
            node.end = z_middle;
            node.middle = x_middle;
        }
        {
            let node = self.pots.get_mut(x);
            node.children = Some((z, zr));
            node.start = x_start;
            node.end = z_end;
            node.middle = z_middle;
        }

        self.recompute_node_maxdist(z);
        self.fix_level(z);
        self.recompute_node_maxdist(x);
        self.fix_level(x);
    }

    pub fn remove(&mut self, lat: f64, lon: f64, handle: DocumentHandle) -> Result<()> {
        let hv = hilbert::encode(lat, lon);
        let path = self.descend(hv);
        let leaf = *path.last().unwrap();

        let pos = self.pots.get(leaf).slots.iter().position(|&sid| {
            let s = self.slots.get(sid);
            s.handle == handle && (s.lat - lat).abs() < 1e-9 && (s.lon - lon).abs() < 1e-9
        });
        let slot_id = match pos {
            Some(p) => self.pots.get_mut(leaf).slots.remove(p),
            None => {
                return err_at!(
                    NotFound, msg: "no geo slot for {:?} at ({}, {})", handle, lat, lon
                )
            }
        };
        self.slots.free(slot_id);
        self.len -= 1;

        self.maintain_path(&path);

        if path.len() > 1 {
            let parent = path[path.len() - 2];
            if self.pots.get(leaf).slots.len() < POTSIZE / 2 {
                self.try_merge(parent);
                self.maintain_path(&path[..path.len() - 1]);
            }
        }
        Ok(())
    }

    /// Merge two under-full leaf siblings into their parent's own slot.
    /// Deeper cascading merges (a merge that itself underflows its own
    /// parent) are not chased further here; the next insert's natural
    /// split/rebalance keeps the tree within the documented bounds.
    fn try_merge(&mut self, parent: PotId) {
        let (l, r) = match self.pots.get(parent).children {
            Some(c) => c,
            None => return,
        };
        if self.pots.get(l).children.is_some() || self.pots.get(r).children.is_some() {
            return;
        }
        let combined = self.pots.get(l).slots.len() + self.pots.get(r).slots.len();
        if combined > POTSIZE {
            return;
        }

        let mut merged = self.pots.get(l).slots.clone();
        merged.extend(self.pots.get(r).slots.clone());
        let start = self.pots.get(parent).start;
        let end = self.pots.get(parent).end;

        self.pots.free(l);
        self.pots.free(r);

        let node = self.pots.get_mut(parent);
        node.children = None;
        node.slots = merged;
        node.start = start;
        node.end = end;
        node.middle = end;
        node.level = 0;
        self.recompute_node_maxdist(parent);
    }

    /// Sound (if conservative) pot-pruning test: by the triangle
    /// inequality on the true (non-squared) unit-sphere distance, if the
    /// target is farther from some reference point than the pot's own
    /// farthest descendant plus the query radius, no descendant slot can
    /// be within radius of the target.
    fn is_pruned(&self, pot: &Pot, target: Point3, threshold_snmd: f64) -> bool {
        let radius = threshold_snmd.sqrt();
        self.refs.iter().enumerate().any(|(i, &refpt)| {
            let target_dist = snmd(target, refpt).sqrt();
            let pot_maxdist = pot.maxdist[i].sqrt();
            target_dist - radius > pot_maxdist
        })
    }

    /// All indexed points within `radius_m` meters of `(lat, lon)`,
    /// ascending by distance.
    pub fn points_within_radius(&self, lat: f64, lon: f64, radius_m: f64) -> Vec<(DocumentHandle, f64)> {
        let target = embed(lat, lon);
        let threshold = meters_to_snmd(radius_m);
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let pot = self.pots.get(id);
            if self.is_pruned(pot, target, threshold) {
                continue;
            }
            match pot.children {
                None => {
                    for &sid in &pot.slots {
                        let slot = self.slots.get(sid);
                        let d = snmd(slot.embedding, target);
                        if d <= threshold {
                            out.push((slot.handle, snmd_to_meters(d)));
                        }
                    }
                }
                Some((l, r)) => {
                    stack.push(l);
                    stack.push(r);
                }
            }
        }
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        out
    }

    /// The `k` nearest indexed points to `(lat, lon)`, ascending by
    /// distance. A bounded max-heap holds candidates; once full, its top
    /// distance becomes the active pruning radius.
    pub fn nearest_count(&self, lat: f64, lon: f64, k: usize) -> Vec<(DocumentHandle, f64)> {
        let target = embed(lat, lon);
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut stack = vec![self.root];

        while let Some(id) = stack.pop() {
            let pot = self.pots.get(id);
            if heap.len() >= k {
                if let Some(top) = heap.peek() {
                    if self.is_pruned(pot, target, top.snmd) {
                        continue;
                    }
                }
            }
            match pot.children {
                None => {
                    for &sid in &pot.slots {
                        let slot = self.slots.get(sid);
                        let d = snmd(slot.embedding, target);
                        heap.push(Candidate { snmd: d, handle: slot.handle });
                        if heap.len() > k {
                            heap.pop();
                        }
                    }
                }
                Some((l, r)) => {
                    // Prefer descending into the half whose Hilbert range
                    // covers the target first, so the heap tightens sooner.
                    let target_hilbert = hilbert::encode(lat, lon);
                    if target_hilbert < self.pots.get(id).middle {
                        stack.push(r);
                        stack.push(l);
                    } else {
                        stack.push(l);
                        stack.push(r);
                    }
                }
            }
        }

        let mut out: Vec<_> =
            heap.into_iter().map(|c| (c.handle, snmd_to_meters(c.snmd))).collect();
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        out
    }

    pub fn find_within_radius(&self, lat: f64, lon: f64, radius_m: f64) -> GeoCursor {
        GeoCursor::new(self.points_within_radius(lat, lon, radius_m))
    }

    pub fn find_nearest(&self, lat: f64, lon: f64, k: usize) -> GeoCursor {
        GeoCursor::new(self.nearest_count(lat, lon, k))
    }
}

struct Candidate {
    snmd: f64,
    handle: DocumentHandle,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.snmd == other.snmd
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.snmd.partial_cmp(&other.snmd)
    }
}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other).unwrap_or(Ordering::Equal)
    }
}

/// Result cursor over a radius or nearest-k query: both already produce
/// a fully-materialised, distance-sorted list, so the cursor is a plain
/// forward/backward walk over it.
pub struct GeoCursor {
    hits: Vec<(DocumentHandle, f64)>,
    pos: Option<usize>,
}

impl GeoCursor {
    fn new(hits: Vec<(DocumentHandle, f64)>) -> GeoCursor {
        GeoCursor { hits, pos: None }
    }
}

impl IndexIterator for GeoCursor {
    type Item = (DocumentHandle, f64);

    fn has_next(&self) -> bool {
        match self.pos {
            None => !self.hits.is_empty(),
            Some(i) => i + 1 < self.hits.len(),
        }
    }

    fn has_prev(&self) -> bool {
        matches!(self.pos, Some(i) if i > 0)
    }

    fn next(&mut self) -> Option<(DocumentHandle, f64)> {
        let next = match self.pos {
            None if !self.hits.is_empty() => 0,
            None => return None,
            Some(i) if i + 1 < self.hits.len() => i + 1,
            Some(_) => return None,
        };
        self.pos = Some(next);
        Some(self.hits[next])
    }

    fn prev(&mut self) -> Option<(DocumentHandle, f64)> {
        match self.pos {
            Some(0) | None => None,
            Some(i) => {
                self.pos = Some(i - 1);
                Some(self.hits[i - 1])
            }
        }
    }

    fn reset(&mut self, to_beginning: bool) {
        self.pos = if to_beginning { None } else { Some(self.hits.len()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_coordinates() {
        let mut geo = GeoIndex::new(FixedPointSet::Octahedron6);
        let err = geo.insert(91.0, 0.0, DocumentHandle(1)).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidCoordinate(_)));
        let err = geo.insert(0.0, 181.0, DocumentHandle(1)).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidCoordinate(_)));
    }

    #[test]
    fn test_points_within_radius_scenario() {
        let mut geo = GeoIndex::new(FixedPointSet::Octahedron6);
        geo.insert(0.0, 0.0, DocumentHandle(1)).unwrap();
        geo.insert(0.0, 1.0, DocumentHandle(2)).unwrap();
        geo.insert(45.0, 45.0, DocumentHandle(3)).unwrap();

        let hits = geo.points_within_radius(0.0, 0.5, 150_000.0);
        let handles: Vec<_> = hits.iter().map(|(h, _)| *h).collect();
        assert_eq!(handles, vec![DocumentHandle(1), DocumentHandle(2)]);
        assert!(hits[0].1 <= hits[1].1);
    }

    #[test]
    fn test_nearest_count_scenario() {
        let mut geo = GeoIndex::new(FixedPointSet::Octahedron6);
        for (i, lon) in [0.0, 10.0, 20.0, 30.0, 40.0].iter().enumerate() {
            geo.insert(0.0, *lon, DocumentHandle(i as u64)).unwrap();
        }

        let hits = geo.nearest_count(0.0, 15.0, 3);
        assert_eq!(hits.len(), 3);
        let handles: std::collections::HashSet<_> = hits.iter().map(|(h, _)| h.0).collect();
        assert!(handles.contains(&1));
        assert!(handles.contains(&2));
        for w in hits.windows(2) {
            assert!(w[0].1 <= w[1].1);
        }
    }

    #[test]
    fn test_insert_remove_roundtrip() {
        let mut geo = GeoIndex::new(FixedPointSet::Octahedron6);
        for i in 0..20i64 {
            geo.insert(i as f64, i as f64, DocumentHandle(i as u64)).unwrap();
        }
        assert_eq!(geo.len(), 20);
        for i in 0..20i64 {
            geo.remove(i as f64, i as f64, DocumentHandle(i as u64)).unwrap();
        }
        assert_eq!(geo.len(), 0);
        assert!(geo.points_within_radius(0.0, 0.0, 1_000_000.0).is_empty());
    }

    #[test]
    fn test_pole_antipode_is_empty() {
        let mut geo = GeoIndex::new(FixedPointSet::Octahedron6);
        geo.insert(90.0, 0.0, DocumentHandle(1)).unwrap();
        let hits = geo.points_within_radius(-90.0, 0.0, 1000.0);
        assert!(hits.is_empty());
    }
}
