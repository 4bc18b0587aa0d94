//! Module implement the data model shared by every index kind: the
//! document handle an index entry points at, the attribute values it is
//! keyed on, and the shaper that knows how to compare those values.

use std::{cmp::Ordering, fmt, sync::Arc};

/// Opaque identifier for a row in an external collection.
///
/// The index treats this as an unowned pointer-equivalent: its lifetime is
/// longer than any index entry that references it, and the index never
/// dereferences it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DocumentHandle(pub u64);

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "doc:{}", self.0)
    }
}

/// Opaque reference to the collection that owns an [IndexElement].
///
/// Cheap to clone; carried alongside the handle so that multi-collection
/// callers (e.g. a coordinator fan-out) can disambiguate handles that are
/// only unique within their owning collection.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CollectionRef(Arc<str>);

impl CollectionRef {
    pub fn new(name: impl Into<Arc<str>>) -> CollectionRef {
        CollectionRef(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A shaper supplies the comparison of opaque attribute values for one
/// index. It is the abstraction an external collaborator (the document
/// shaper in the surrounding database) plugs in so that this crate never
/// needs to know the concrete representation of an attribute value.
///
/// Implementations must be a strict weak ordering consistent with
/// equality: `compare(a, b) == Ordering::Equal` iff `a` and `b` denote the
/// same logical value.
pub trait Shaper: fmt::Debug {
    type Value: Clone + fmt::Debug;

    fn compare(&self, a: &Self::Value, b: &Self::Value) -> Ordering;

    fn eq(&self, a: &Self::Value, b: &Self::Value) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

/// A shaper for values that are already `Ord` — the common case in tests
/// and for indexes built directly over native Rust types.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeShaper<V>(std::marker::PhantomData<V>);

impl<V> NativeShaper<V> {
    pub fn new() -> NativeShaper<V> {
        NativeShaper(std::marker::PhantomData)
    }
}

impl<V: Clone + fmt::Debug + Ord> Shaper for NativeShaper<V> {
    type Value = V;

    fn compare(&self, a: &V, b: &V) -> Ordering {
        a.cmp(b)
    }
}

/// One attribute value inside an [IndexElement], tagged by its position in
/// the index's declared attribute list (arity).
pub type AttributeValue<V> = V;

/// A boxed, shareable comparator: the run-time form of [Shaper::compare]
/// that [operator::IndexOperator] and every index's `find` carry around.
/// Keeping it as a plain function object (rather than a `dyn Shaper`) lets
/// the operator tree stay object-safe regardless of the shaper's own
/// associated-type machinery.
pub type CompareFn<V> = Arc<dyn Fn(&V, &V) -> Ordering + Send + Sync>;

/// Adapt a [Shaper] into the boxed [CompareFn] form.
pub fn shaper_to_compare_fn<S>(shaper: S) -> CompareFn<S::Value>
where
    S: Shaper + Send + Sync + 'static,
{
    Arc::new(move |a, b| shaper.compare(a, b))
}

/// An index element: a document handle, the tuple of attribute values the
/// index is keyed on, and the collection that owns the handle.
///
/// For the skip list and geo index, element identity is the pair
/// `(handle, values)`. For the bitarray index only the handle is tracked;
/// the bitmap columns are addressed by `(block, bit)` instead.
#[derive(Clone, Debug)]
pub struct IndexElement<V> {
    pub handle: DocumentHandle,
    pub values: Vec<V>,
    pub collection: CollectionRef,
}

impl<V> IndexElement<V> {
    pub fn new(handle: DocumentHandle, values: Vec<V>, collection: CollectionRef) -> Self {
        IndexElement { handle, values, collection }
    }

    pub fn arity(&self) -> usize {
        self.values.len()
    }
}

impl<V: PartialEq> PartialEq for IndexElement<V> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle && self.values == other.values
    }
}
