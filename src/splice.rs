use rustc_hash::FxHashMap;

use crate::alignment::{AlignmentRecord, Strand};

/// Thresholds a candidate junction must meet before it is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpliceLoadOptions {
    /// Minimum supporting-read count.
    pub min_junction_coverage: u32,
    /// Minimum exact-match length on both sides of the gap.
    pub min_read_flanking_width: u64,
}

impl Default for SpliceLoadOptions {
    fn default() -> Self {
        SpliceLoadOptions {
            min_junction_coverage: 1,
            min_read_flanking_width: 0,
        }
    }
}

/// A gap within gapped alignments interpreted as an exon-exon boundary,
/// with the number of reads supporting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpliceJunction {
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub depth: u32,
}

/// Aggregates splice-junction evidence from gapped records during a tile
/// load. Evidence only counts when both flanking blocks meet the minimum
/// flank width; a junction is materialized once its supporting-read count
/// reaches the minimum coverage.
#[derive(Debug, Default)]
pub struct SpliceJunctionCollector {
    options: SpliceLoadOptions,
    candidates: FxHashMap<(u64, u64, Strand), u32>,
}

impl SpliceJunctionCollector {
    pub fn new(options: SpliceLoadOptions) -> Self {
        SpliceJunctionCollector {
            options,
            candidates: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, record: &AlignmentRecord) {
        for gap in record.gaps() {
            if gap.left_flank < self.options.min_read_flanking_width
                || gap.right_flank < self.options.min_read_flanking_width
            {
                continue;
            }
            *self
                .candidates
                .entry((gap.start, gap.end, record.strand))
                .or_insert(0) += 1;
        }
    }

    /// Junctions meeting the coverage threshold, sorted by position.
    pub fn materialize(&self) -> Vec<SpliceJunction> {
        let mut junctions: Vec<SpliceJunction> = self
            .candidates
            .iter()
            .filter(|(_, &depth)| depth >= self.options.min_junction_coverage)
            .map(|(&(start, end, strand), &depth)| SpliceJunction {
                start,
                end,
                strand,
                depth,
            })
            .collect();
        junctions.sort_by_key(|j| (j.start, j.end, j.strand));
        junctions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spliced(name: &str, exon1: (u64, u64), exon2: (u64, u64)) -> AlignmentRecord {
        AlignmentRecord::with_exons(name, "chr1", &[exon1, exon2])
    }

    #[test]
    fn junction_needs_min_coverage() {
        let mut collector = SpliceJunctionCollector::new(SpliceLoadOptions {
            min_junction_coverage: 2,
            min_read_flanking_width: 0,
        });

        collector.add(&spliced("a", (100, 150), (250, 300)));
        assert!(collector.materialize().is_empty());

        collector.add(&spliced("b", (90, 150), (250, 280)));
        let junctions = collector.materialize();
        assert_eq!(junctions.len(), 1);
        assert_eq!((junctions[0].start, junctions[0].end), (150, 250));
        assert_eq!(junctions[0].depth, 2);
    }

    #[test]
    fn short_flanks_do_not_count() {
        let mut collector = SpliceJunctionCollector::new(SpliceLoadOptions {
            min_junction_coverage: 1,
            min_read_flanking_width: 20,
        });

        // left exon only 10bp
        collector.add(&spliced("a", (140, 150), (250, 300)));
        assert!(collector.materialize().is_empty());

        collector.add(&spliced("b", (100, 150), (250, 300)));
        assert_eq!(collector.materialize().len(), 1);
    }

    #[test]
    fn strands_kept_separate() {
        let mut collector = SpliceJunctionCollector::new(SpliceLoadOptions::default());

        let fwd = spliced("f", (100, 150), (250, 300));
        let mut rev = spliced("r", (100, 150), (250, 300));
        rev.strand = Strand::Reverse;

        collector.add(&fwd);
        collector.add(&rev);

        let junctions = collector.materialize();
        assert_eq!(junctions.len(), 2);
        assert!(junctions.iter().all(|j| j.depth == 1));
    }

    #[test]
    fn ungapped_records_yield_nothing() {
        let mut collector = SpliceJunctionCollector::new(SpliceLoadOptions::default());
        collector.add(&AlignmentRecord::new("plain", "chr1", 100, 200));
        assert!(collector.materialize().is_empty());
    }
}
