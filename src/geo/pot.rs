//! Module implement the geo index's slot and pot arenas.
//!
//! Grounded on the source's `GeoCoordinate`/`GeoPot` pair; both the slot
//! array and the pot array grow (and, for pots, shrink via a free-list)
//! by index rather than by pointer, so a realloc of either backing `Vec`
//! never invalidates a reference held by another pot (§geo design notes).

use crate::element::DocumentHandle;
use crate::geo::distance::Point3;

pub type PotId = u32;
pub type SlotId = u32;

pub const POTSIZE: usize = 4;

/// A single indexed geo point.
#[derive(Clone, Copy, Debug)]
pub struct Slot {
    pub lat: f64,
    pub lon: f64,
    pub handle: DocumentHandle,
    pub hilbert: u64,
    pub embedding: Point3,
}

pub struct SlotArena {
    slots: Vec<Option<Slot>>,
    free: Vec<SlotId>,
}

impl SlotArena {
    pub fn new() -> SlotArena {
        SlotArena { slots: Vec::new(), free: Vec::new() }
    }

    pub fn alloc(&mut self, slot: Slot) -> SlotId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Some(slot);
                id
            }
            None => {
                self.slots.push(Some(slot));
                (self.slots.len() - 1) as SlotId
            }
        }
    }

    pub fn get(&self, id: SlotId) -> &Slot {
        self.slots[id as usize].as_ref().expect("access to freed geo slot")
    }

    pub fn free(&mut self, id: SlotId) {
        self.slots[id as usize] = None;
        self.free.push(id);
    }
}

impl Default for SlotArena {
    fn default() -> Self {
        SlotArena::new()
    }
}

/// A node in the geo index's balanced tree: either a leaf holding up to
/// [POTSIZE] slot ids, or an internal node splitting the Hilbert range
/// covered by its two children.
pub struct Pot {
    pub start: u64,
    pub middle: u64,
    pub end: u64,
    pub level: u8,
    pub maxdist: Vec<f64>,
    pub children: Option<(PotId, PotId)>,
    pub slots: Vec<SlotId>,
}

impl Pot {
    pub fn leaf(start: u64, end: u64, num_refs: usize) -> Pot {
        Pot {
            start,
            middle: end,
            end,
            level: 0,
            maxdist: vec![0.0; num_refs],
            children: None,
            slots: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }
}

pub struct PotArena {
    pots: Vec<Option<Pot>>,
    free: Vec<PotId>,
}

impl PotArena {
    pub fn new() -> PotArena {
        PotArena { pots: Vec::new(), free: Vec::new() }
    }

    pub fn alloc(&mut self, pot: Pot) -> PotId {
        match self.free.pop() {
            Some(id) => {
                self.pots[id as usize] = Some(pot);
                id
            }
            None => {
                self.pots.push(Some(pot));
                (self.pots.len() - 1) as PotId
            }
        }
    }

    pub fn get(&self, id: PotId) -> &Pot {
        self.pots[id as usize].as_ref().expect("access to freed geo pot")
    }

    pub fn get_mut(&mut self, id: PotId) -> &mut Pot {
        self.pots[id as usize].as_mut().expect("access to freed geo pot")
    }

    pub fn free(&mut self, id: PotId) {
        self.pots[id as usize] = None;
        self.free.push(id);
    }
}

impl Default for PotArena {
    fn default() -> Self {
        PotArena::new()
    }
}
