use std::sync::Arc;

use crate::alignment::AlignmentRecord;
use crate::coverage::Coverage;
use crate::range::GenomicRange;
use crate::sample::DownsampledInterval;
use crate::splice::SpliceJunction;

/// Immutable snapshot of a loaded range: the retained records in ascending
/// start order, per-base coverage, materialized splice junctions, and the
/// downsample markers. Created once per tile load; a larger load for the
/// same viewport supersedes it rather than updating it.
#[derive(Debug, Clone)]
pub struct AlignmentInterval {
    range: GenomicRange,
    records: Vec<Arc<AlignmentRecord>>,
    coverage: Coverage,
    junctions: Vec<SpliceJunction>,
    downsampled: Vec<DownsampledInterval>,
}

impl AlignmentInterval {
    pub fn new(
        range: GenomicRange,
        records: Vec<Arc<AlignmentRecord>>,
        coverage: Coverage,
        junctions: Vec<SpliceJunction>,
        downsampled: Vec<DownsampledInterval>,
    ) -> Self {
        AlignmentInterval {
            range,
            records,
            coverage,
            junctions,
            downsampled,
        }
    }

    pub fn range(&self) -> &GenomicRange {
        &self.range
    }

    /// An interval satisfies a query range iff its own range contains it.
    pub fn contains(&self, query: &GenomicRange) -> bool {
        self.range.contains(query)
    }

    pub fn records(&self) -> &[Arc<AlignmentRecord>] {
        &self.records
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    pub fn junctions(&self) -> &[SpliceJunction] {
        &self.junctions
    }

    pub fn downsampled_intervals(&self) -> &[DownsampledInterval] {
        &self.downsampled
    }
}
