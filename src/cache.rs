use rustc_hash::FxHashMap;

use crate::range::GenomicRange;
use crate::view::ViewportId;

/// Containment-indexed cache with one slot per viewport.
///
/// A slot holds the most recently stored value together with the range it
/// was loaded for; a query hits iff the stored range contains the query
/// range. There is no eviction beyond single-slot overwrite, so the memory
/// bound is the number of concurrently open viewports.
///
/// Used twice by the manager: once for loaded intervals, once for packed
/// alignments.
#[derive(Debug, Clone)]
pub struct RangeCache<V> {
    slots: FxHashMap<ViewportId, (GenomicRange, V)>,
}

impl<V> Default for RangeCache<V> {
    fn default() -> Self {
        RangeCache {
            slots: FxHashMap::default(),
        }
    }
}

impl<V> RangeCache<V> {
    /// The cached value for `slot`, if its stored range contains `query`.
    /// A miss is simply absent, never an error.
    pub fn get(&self, slot: ViewportId, query: &GenomicRange) -> Option<&V> {
        let (range, value) = self.slots.get(&slot)?;
        range.contains(query).then_some(value)
    }

    pub fn contains(&self, slot: ViewportId, query: &GenomicRange) -> bool {
        self.get(slot, query).is_some()
    }

    /// Like `get`, but also yields the range the value was stored under
    /// (which may be wider than the query).
    pub fn get_entry(&self, slot: ViewportId, query: &GenomicRange) -> Option<(&GenomicRange, &V)> {
        let (range, value) = self.slots.get(&slot)?;
        range.contains(query).then_some((range, value))
    }

    /// Overwrites the slot's entry unconditionally.
    pub fn put(&mut self, slot: ViewportId, range: GenomicRange, value: V) {
        self.slots.insert(slot, (range, value));
    }

    pub fn remove(&mut self, slot: ViewportId) -> Option<V> {
        self.slots.remove(&slot).map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.slots.values().map(|(_, v)| v)
    }
}
