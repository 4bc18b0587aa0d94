//! `ordix` implements the ordered-index substrate of a document-oriented
//! database: a probabilistic ordered index (skip list, unique and
//! multi-valued), a bitmap secondary index, and a spatial index over the
//! surface of a sphere. All three are consumed uniformly through a shared
//! [IndexOperator] predicate tree and [IndexIterator] result cursor.
//!
//! Every write is stamped with a caller-supplied transaction id. The skip
//! list carries an explicit MVCC visibility rule (`inserted_by <= tx <
//! deleted_by`); logically removed nodes are handed to a background
//! [skiplist::gc::GarbageCollector] for deferred physical unlinking once no
//! live reader can still observe them. The bitmap and geo indexes have no
//! such deferral: bitmap slots are reclaimed synchronously on remove, and
//! geo pots are merged synchronously during AVL rebalancing.
//!
//! Query planning, join execution, on-disk WAL format, cluster sharding,
//! authentication and storage-engine file layout are out of scope; this
//! crate assumes an external transaction context assigns `tx_id` values and
//! tracks the set of active reader transactions.

#[macro_use]
mod error;
mod util;

mod element;
pub mod iterator;
pub mod operator;

pub mod bitarray;
pub mod geo;
pub mod skiplist;
pub mod skiplist_index;

pub mod index;

pub use crate::element::{AttributeValue, CollectionRef, DocumentHandle, IndexElement, Shaper};
pub use crate::error::{Error, Result};
pub use crate::geo::FixedPointSet;
pub use crate::index::{new_bitarray_index, new_geo_index, new_skiplist_index, Descriptor};
pub use crate::iterator::{IndexIterator, Interval};
pub use crate::operator::{IndexOperator, OperatorKind};
pub use crate::skiplist::Probability;

pub use crate::bitarray::Bitarray;
pub use crate::geo::GeoIndex;
pub use crate::skiplist_index::SkipListIndex;
