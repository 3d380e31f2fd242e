use crate::alignment::{AlignmentRecord, Strand};
use crate::range::GenomicRange;

/// Per-base depth counts over a loaded range, optionally stratified by
/// strand. Positions outside the range are ignored (a record retained near
/// the edge can hang past it).
#[derive(Debug, Clone)]
pub struct Coverage {
    range: GenomicRange,
    total: Vec<u32>,
    strata: Option<StrandCounts>,
}

#[derive(Debug, Clone)]
struct StrandCounts {
    forward: Vec<u32>,
    reverse: Vec<u32>,
}

impl Coverage {
    pub fn new(range: GenomicRange, stratify_by_strand: bool) -> Self {
        let len = range.len() as usize;
        let strata = stratify_by_strand.then(|| StrandCounts {
            forward: vec![0; len],
            reverse: vec![0; len],
        });
        Coverage {
            range,
            total: vec![0; len],
            strata,
        }
    }

    pub fn range(&self) -> &GenomicRange {
        &self.range
    }

    /// Increment counters across every aligned block of `record`.
    pub fn increment(&mut self, record: &AlignmentRecord) {
        if record.chrom != self.range.chrom {
            return;
        }
        for block in &record.blocks {
            let start = block.start.max(self.range.start);
            let end = block.end().min(self.range.end);
            for pos in start..end {
                let i = (pos - self.range.start) as usize;
                self.total[i] += 1;
                if let Some(strata) = &mut self.strata {
                    match record.strand {
                        Strand::Forward => strata.forward[i] += 1,
                        Strand::Reverse => strata.reverse[i] += 1,
                    }
                }
            }
        }
    }

    pub fn depth_at(&self, pos: u64) -> u32 {
        self.index_of(pos).map(|i| self.total[i]).unwrap_or(0)
    }

    pub fn forward_at(&self, pos: u64) -> Option<u32> {
        let i = self.index_of(pos)?;
        self.strata.as_ref().map(|s| s.forward[i])
    }

    pub fn reverse_at(&self, pos: u64) -> Option<u32> {
        let i = self.index_of(pos)?;
        self.strata.as_ref().map(|s| s.reverse[i])
    }

    pub fn max_depth(&self) -> u32 {
        self.total.iter().copied().max().unwrap_or(0)
    }

    fn index_of(&self, pos: u64) -> Option<usize> {
        (pos >= self.range.start && pos < self.range.end)
            .then(|| (pos - self.range.start) as usize)
    }
}
