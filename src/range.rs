use std::sync::Arc;

/// A half-open genomic interval `[start, end)` on a named chromosome.
///
/// Containment of one range in another is the primitive the interval and
/// packed caches are built on, so it's a first-class operation here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicRange {
    pub chrom: Arc<str>,
    pub start: u64,
    pub end: u64,
}

impl GenomicRange {
    pub fn new(chrom: impl Into<Arc<str>>, start: u64, end: u64) -> Self {
        let chrom = chrom.into();
        debug_assert!(!chrom.is_empty());
        debug_assert!(start <= end);
        Self { chrom, start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn center(&self) -> u64 {
        self.start + self.len() / 2
    }

    pub fn contains(&self, other: &GenomicRange) -> bool {
        self.chrom == other.chrom && self.start <= other.start && self.end >= other.end
    }

    pub fn contains_pos(&self, chrom: &str, pos: u64) -> bool {
        *self.chrom == *chrom && pos >= self.start && pos < self.end
    }

    pub fn overlaps(&self, other: &GenomicRange) -> bool {
        self.chrom == other.chrom && self.start < other.end && other.start < self.end
    }

    /// Widen symmetrically around the center so the result spans at least
    /// `min_len` bases (clamped at position zero). The original range is
    /// always contained in the result.
    pub fn expanded_around_center(&self, min_len: u64) -> GenomicRange {
        if self.len() >= min_len {
            return self.clone();
        }
        let center = self.center();
        let half = min_len / 2;
        let start = self.start.min(center.saturating_sub(half));
        let end = self.end.max(center + half);
        GenomicRange::new(self.chrom.clone(), start, end)
    }
}

impl std::fmt::Display for GenomicRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

impl std::str::FromStr for GenomicRange {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> anyhow::Result<Self> {
        let (chrom, range) = text
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("Expected `chrom:start-end`, got `{text}`"))?;
        if chrom.is_empty() {
            anyhow::bail!("Empty chromosome name in `{text}`");
        }
        let (from, to) = range
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("Expected `start-end` in `{text}`"))?;
        // tolerate thousands separators as typed into a locus box
        let from: u64 = from.replace(',', "").parse()?;
        let to: u64 = to.replace(',', "").parse()?;
        if from > to {
            anyhow::bail!("Range start {from} is past end {to}");
        }
        Ok(GenomicRange::new(chrom, from, to))
    }
}
