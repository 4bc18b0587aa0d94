//! Module implement the uniform construction entry point: a single
//! [Descriptor] carrying every recognised option, and one factory
//! function per index kind that validates and forwards the options it
//! understands.

use crate::bitarray::Bitarray;
use crate::element::CompareFn;
use crate::error::Result;
use crate::geo::{FixedPointSet, GeoIndex};
use crate::skiplist::Probability;
use crate::skiplist_index::SkipListIndex;

/// Every option recognised by any index kind; a given factory function
/// reads only the fields relevant to the kind it constructs.
#[derive(Clone, Default)]
pub struct Descriptor<V> {
    pub unique: bool,
    pub sparse: bool,
    pub allow_partial: bool,
    pub num_attributes: usize,
    pub probability: Option<Probability>,
    pub max_height: Option<usize>,
    pub supports_undef: bool,
    pub value_lists: Vec<Vec<Option<V>>>,
    pub fixed_point_set: Option<FixedPointSet>,
    pub shaper: Option<CompareFn<V>>,
}

impl<V> Descriptor<V> {
    pub fn new(num_attributes: usize) -> Descriptor<V> {
        Descriptor {
            unique: false,
            sparse: false,
            allow_partial: false,
            num_attributes,
            probability: None,
            max_height: None,
            supports_undef: false,
            value_lists: Vec::new(),
            fixed_point_set: None,
            shaper: None,
        }
    }
}

pub fn new_skiplist_index<V>(name: &str, descriptor: Descriptor<V>) -> Result<SkipListIndex<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let shaper = match descriptor.shaper {
        Some(s) => s,
        None => return err_at!(BadParameter, msg: "skip-list index requires a shaper"),
    };
    let height = descriptor.max_height.unwrap_or(crate::skiplist::MAX_HEIGHT);
    let probability = descriptor.probability.unwrap_or(Probability::Half);
    SkipListIndex::new(
        name,
        descriptor.unique,
        descriptor.num_attributes,
        descriptor.sparse,
        height,
        probability,
        shaper,
    )
}

pub fn new_bitarray_index<V: Clone>(descriptor: Descriptor<V>) -> Result<Bitarray<V>> {
    let shaper = match descriptor.shaper {
        Some(s) => s,
        None => return err_at!(BadParameter, msg: "bitarray index requires a shaper"),
    };
    Bitarray::new(descriptor.value_lists, descriptor.supports_undef, shaper)
}

pub fn new_geo_index<V>(descriptor: Descriptor<V>) -> GeoIndex {
    let fps = descriptor.fixed_point_set.unwrap_or(FixedPointSet::Octahedron6);
    GeoIndex::new(fps)
}
