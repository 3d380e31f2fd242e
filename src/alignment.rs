use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::range::GenomicRange;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Strand {
    #[default]
    Forward,
    Reverse,
}

impl std::str::FromStr for Strand {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Self::Forward),
            "-" => Ok(Self::Reverse),
            _ => Err("Strand must be + or -"),
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strand::Forward => f.write_str("+"),
            Strand::Reverse => f.write_str("-"),
        }
    }
}

/// Location of a record's mate, when the record is paired.
#[derive(Debug, Clone)]
pub struct MateInfo {
    pub chrom: Arc<str>,
    pub start: u64,
    pub mapped: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFlags {
    pub paired: bool,
    pub proper_pair: bool,
    pub secondary: bool,
    pub duplicate: bool,
    pub vendor_failed: bool,
}

/// One contiguous aligned stretch of a read, in reference coordinates.
///
/// `seq_offset` is the offset of the block's first base in the record's
/// read sequence, so reference positions can be mapped back to base calls.
#[derive(Debug, Clone, Copy)]
pub struct AlignedBlock {
    pub start: u64,
    pub len: u64,
    pub seq_offset: usize,
}

impl AlignedBlock {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// A skipped region (CIGAR `N`) between two aligned blocks of the same
/// record, with the exact lengths of the flanking blocks. Candidate
/// splice-junction evidence; deletions are not gaps in this sense.
#[derive(Debug, Clone, Copy)]
pub struct BlockGap {
    pub start: u64,
    pub end: u64,
    pub left_flank: u64,
    pub right_flank: u64,
}

/// One sequencing read's placement on the reference.
///
/// Records are produced by a tile load and owned by the resulting interval;
/// packing and sorting share them by `Arc` and never mutate them.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub name: String,
    pub chrom: Arc<str>,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub mapping_quality: Option<u8>,
    pub flags: RecordFlags,
    pub blocks: Vec<AlignedBlock>,
    /// Skipped regions between blocks, with flanking block lengths. Filled
    /// in from the CIGAR at construction; empty for ungapped records.
    pub splice_gaps: Vec<BlockGap>,
    pub sequence: Vec<u8>,
    pub read_group: Option<String>,
    pub sample: Option<String>,
    pub tags: FxHashMap<String, String>,
    pub mate: Option<MateInfo>,
    pub template_len: i64,
}

impl AlignmentRecord {
    /// A minimal ungapped record; fields beyond the span get defaults.
    pub fn new(name: impl Into<String>, chrom: impl Into<Arc<str>>, start: u64, end: u64) -> Self {
        let chrom = chrom.into();
        AlignmentRecord {
            name: name.into(),
            chrom,
            start,
            end,
            strand: Strand::Forward,
            mapping_quality: None,
            flags: RecordFlags::default(),
            blocks: vec![AlignedBlock {
                start,
                len: end - start,
                seq_offset: 0,
            }],
            splice_gaps: Vec::new(),
            sequence: Vec::new(),
            read_group: None,
            sample: None,
            tags: FxHashMap::default(),
            mate: None,
            template_len: 0,
        }
    }

    pub fn span(&self) -> GenomicRange {
        GenomicRange::new(self.chrom.clone(), self.start, self.end)
    }

    pub fn is_proper_pair(&self) -> bool {
        self.flags.paired && self.flags.proper_pair
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(|v| v.as_str())
    }

    /// The base call covering reference position `pos`, if an aligned block
    /// spans it and the read sequence is present. Deleted/skipped positions
    /// yield `None`.
    pub fn base_at(&self, pos: u64) -> Option<u8> {
        let i = self.blocks.partition_point(|b| b.end() <= pos);
        let block = self.blocks.get(i)?;
        if pos < block.start {
            return None;
        }
        let offset = block.seq_offset + (pos - block.start) as usize;
        self.sequence.get(offset).copied()
    }

    /// Skipped regions of a gapped alignment (exon-exon candidates).
    pub fn gaps(&self) -> impl Iterator<Item = BlockGap> + '_ {
        self.splice_gaps.iter().copied()
    }

    /// A spliced record covering the given exons, with the inter-exon
    /// regions registered as gaps. Exons must be ascending and disjoint.
    pub fn with_exons(
        name: impl Into<String>,
        chrom: impl Into<Arc<str>>,
        exons: &[(u64, u64)],
    ) -> Self {
        assert!(!exons.is_empty());
        let mut rec = Self::new(name, chrom, exons[0].0, exons[exons.len() - 1].1);
        let mut seq_offset = 0usize;
        rec.blocks = exons
            .iter()
            .map(|&(start, end)| {
                let block = AlignedBlock {
                    start,
                    len: end - start,
                    seq_offset,
                };
                seq_offset += (end - start) as usize;
                block
            })
            .collect();
        rec.splice_gaps = rec
            .blocks
            .windows(2)
            .filter(|pair| pair[1].start > pair[0].end())
            .map(|pair| BlockGap {
                start: pair[0].end(),
                end: pair[1].start,
                left_flank: pair[0].len,
                right_flank: pair[1].len,
            })
            .collect();
        rec
    }
}

/// Two mates coalesced into one lane occupant, spanning both extents.
/// `second` is absent when the mate wasn't loaded or fell out of range.
#[derive(Debug, Clone)]
pub struct PairedFeature {
    pub first: Arc<AlignmentRecord>,
    pub second: Option<Arc<AlignmentRecord>>,
}

impl PairedFeature {
    pub fn start(&self) -> u64 {
        match &self.second {
            Some(s) => self.first.start.min(s.start),
            None => self.first.start,
        }
    }

    pub fn end(&self) -> u64 {
        match &self.second {
            Some(s) => self.first.end.max(s.end),
            None => self.first.end,
        }
    }
}

/// A lane occupant: a single record, or a coalesced mate pair.
#[derive(Debug, Clone)]
pub enum PackedFeature {
    Single(Arc<AlignmentRecord>),
    Pair(PairedFeature),
}

impl PackedFeature {
    pub fn start(&self) -> u64 {
        match self {
            PackedFeature::Single(r) => r.start,
            PackedFeature::Pair(p) => p.start(),
        }
    }

    pub fn end(&self) -> u64 {
        match self {
            PackedFeature::Single(r) => r.end,
            PackedFeature::Pair(p) => p.end(),
        }
    }

    /// The record used for attribute lookups (grouping, sort keys).
    pub fn primary(&self) -> &AlignmentRecord {
        match self {
            PackedFeature::Single(r) => r,
            PackedFeature::Pair(p) => &p.first,
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<AlignmentRecord>> {
        let (a, b) = match self {
            PackedFeature::Single(r) => (r, None),
            PackedFeature::Pair(p) => (&p.first, p.second.as_ref()),
        };
        std::iter::once(a).chain(b)
    }

    /// Whether any constituent record's span covers `pos`.
    pub fn spans_pos(&self, pos: u64) -> bool {
        self.records().any(|r| pos >= r.start && pos < r.end)
    }
}
