use std::sync::atomic::{AtomicU64, Ordering};

use crate::range::GenomicRange;

/// Opaque identity of a viewport (a visual window over the genome).
///
/// Cache slots are keyed by this identity, not by coordinates, so two
/// viewports currently showing the same region keep independent cached
/// data. IDs are process-unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewportId(pub u64);

static NEXT_VIEWPORT_ID: AtomicU64 = AtomicU64::new(0);

impl ViewportId {
    pub fn next() -> Self {
        ViewportId(NEXT_VIEWPORT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A viewport's identity plus the range it currently displays.
///
/// The range changes as the user pans and zooms; the id does not.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub id: ViewportId,
    pub range: GenomicRange,
}

impl Viewport {
    pub fn new(range: GenomicRange) -> Self {
        Viewport {
            id: ViewportId::next(),
            range,
        }
    }

    pub fn with_range(&self, range: GenomicRange) -> Self {
        Viewport {
            id: self.id,
            range,
        }
    }
}
