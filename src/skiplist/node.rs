//! Module implement the arena-indexed skip-list node.
//!
//! The source stores each node's tower as a heap array of raw `(prev,
//! next)` pointers; growing the head/tail sentinel reallocates that array
//! and invalidates every address taken into it. Here a node's tower is a
//! `Vec<(NodeId, NodeId)>` of arena indices, so growth never invalidates a
//! reference held by another node — only the arena's own backing `Vec`
//! reallocates, and nothing outside the arena holds a raw pointer into it.

use crate::element::IndexElement;

/// Index into a [super::arena::Arena]. `NIL` stands in for "no such node"
/// (e.g. a level a node's tower doesn't reach).
pub type NodeId = u32;

pub const NIL: NodeId = u32::MAX;

/// Per-node state used while a tower is being spliced in or unlinked.
/// Every transition happens while the arena's writer latch is held, so in
/// this implementation the state word itself needs no atomics; it exists
/// to preserve the source's reader contract: a reader that observes
/// `Joining` or `Extending` at some level retries one level down rather
/// than trusting the link it just read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TowerState {
    Stable,
    Extending,
    Joining,
}

/// A skip-list node. The head and tail sentinels carry `element: None`,
/// `inserted_by: 0` and are never visible to a lookup; every other node
/// carries a real element and is subject to the MVCC visibility rule.
#[derive(Clone, Debug)]
pub struct Node<V> {
    pub element: Option<IndexElement<V>>,
    pub column: Vec<(NodeId, NodeId)>,
    pub inserted_by: u64,
    pub deleted_by: u64,
    pub state: TowerState,
}

impl<V> Node<V> {
    pub fn sentinel(height: usize) -> Node<V> {
        Node {
            element: None,
            column: vec![(NIL, NIL); height],
            inserted_by: 0,
            deleted_by: u64::MAX,
            state: TowerState::Stable,
        }
    }

    pub fn new(element: IndexElement<V>, height: usize, tx_id: u64) -> Node<V> {
        Node {
            element: Some(element),
            column: vec![(NIL, NIL); height],
            inserted_by: tx_id,
            deleted_by: u64::MAX,
            state: TowerState::Extending,
        }
    }

    pub fn height(&self) -> usize {
        self.column.len()
    }

    /// MVCC visibility: `inserted_by <= tx < deleted_by`.
    pub fn visible_at(&self, tx_id: u64) -> bool {
        self.inserted_by <= tx_id && self.deleted_by > tx_id
    }

    pub fn is_ghosted(&self) -> bool {
        self.deleted_by != u64::MAX
    }

    pub fn keys(&self) -> Option<&[V]> {
        self.element.as_ref().map(|e| e.values.as_slice())
    }
}
