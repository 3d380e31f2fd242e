use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use noodles::core::{Position, Region};
use noodles::bam::bai;
use noodles::{bam, bgzf, csi, sam};

use crate::alignment::{AlignedBlock, AlignmentRecord, BlockGap, MateInfo, RecordFlags, Strand};
use crate::range::GenomicRange;

/// The capability set this core consumes from any alignment file format:
/// query a range for records, and report index/header metadata. One variant
/// per format; selection happens in [`open_source`].
pub trait AlignmentSource: Send {
    /// Records overlapping `range`, ascending by start. Lazy where the
    /// format allows, finite, not restartable within one call.
    fn query<'a>(
        &'a mut self,
        range: &GenomicRange,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<AlignmentRecord>> + 'a>>;

    fn has_index(&self) -> bool;

    /// Sequence names from the header dictionary, if the format has one.
    fn sequence_names(&self) -> Option<Vec<String>>;

    /// Sequencing platforms from `@RG PL:` header fields.
    fn platforms(&self) -> Option<HashSet<String>>;
}

/// Select a source implementation by file extension.
pub fn open_source(path: impl AsRef<Path>) -> anyhow::Result<Box<dyn AlignmentSource>> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if name.ends_with(".bam") {
        Ok(Box::new(BamSource::open(path)?))
    } else if name.ends_with(".sam") {
        Ok(Box::new(SamSource::open(path)?))
    } else {
        anyhow::bail!("Unsupported alignment file type: {}", path.display())
    }
}

fn header_platforms(header: &sam::Header) -> Option<HashSet<String>> {
    let mut platforms = HashSet::new();
    for (_name, read_group) in header.read_groups() {
        for (tag, value) in read_group.other_fields() {
            if tag.as_ref() == b"PL" {
                platforms.insert(value.to_string().to_ascii_uppercase());
            }
        }
    }
    (!platforms.is_empty()).then_some(platforms)
}

fn header_sequence_names(header: &sam::Header) -> Option<Vec<String>> {
    let names: Vec<String> = header
        .reference_sequences()
        .keys()
        .map(|name| name.to_string())
        .collect();
    (!names.is_empty()).then_some(names)
}

fn region_for(range: &GenomicRange) -> anyhow::Result<Region> {
    // half-open 0-based to closed 1-based
    let start = Position::try_from((range.start + 1) as usize)?;
    let end = Position::try_from(range.end.max(range.start + 1) as usize)?;
    Ok(Region::new(&*range.chrom, start..=end))
}

/// Convert a decoded record into this crate's own record type. Unmapped
/// records yield `None`; everything downstream of the source boundary is
/// noodles-free.
fn convert_record(header: &sam::Header, record: &sam::alignment::RecordBuf) -> Option<AlignmentRecord> {
    use sam::alignment::record::cigar::op::Kind;
    use sam::alignment::record::data::field::Tag;
    use sam::alignment::record_buf::data::field::Value;

    let flags = record.flags();
    if flags.is_unmapped() {
        return None;
    }

    let ref_id = record.reference_sequence_id()?;
    let (ref_name, _) = header.reference_sequences().get_index(ref_id)?;
    let chrom: Arc<str> = Arc::from(ref_name.to_string().as_str());

    let start = usize::from(record.alignment_start()?) as u64 - 1;

    // walk the cigar once: aligned blocks (split on deletions and skips),
    // splice gaps (skips only), and the reference end
    let mut blocks = Vec::new();
    let mut splice_gaps = Vec::new();
    let mut ref_pos = start;
    let mut seq_offset = 0usize;
    let mut block_start = start;
    let mut block_seq_offset = 0usize;
    let mut pending_skip: Option<u64> = None;

    let mut close_block = |blocks: &mut Vec<AlignedBlock>,
                           splice_gaps: &mut Vec<BlockGap>,
                           block_start: u64,
                           ref_pos: u64,
                           block_seq_offset: usize,
                           pending_skip: &mut Option<u64>| {
        if ref_pos > block_start {
            let block = AlignedBlock {
                start: block_start,
                len: ref_pos - block_start,
                seq_offset: block_seq_offset,
            };
            if let (Some(gap_start), Some(prev)) = (pending_skip.take(), blocks.last()) {
                let prev: &AlignedBlock = prev;
                splice_gaps.push(BlockGap {
                    start: gap_start,
                    end: block.start,
                    left_flank: prev.len,
                    right_flank: block.len,
                });
            }
            blocks.push(block);
        }
    };

    for op in record.cigar().as_ref().iter() {
        let len = op.len() as u64;
        match op.kind() {
            Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => {
                ref_pos += len;
                seq_offset += len as usize;
            }
            Kind::Insertion | Kind::SoftClip => {
                seq_offset += len as usize;
            }
            Kind::Deletion => {
                close_block(
                    &mut blocks,
                    &mut splice_gaps,
                    block_start,
                    ref_pos,
                    block_seq_offset,
                    &mut pending_skip,
                );
                ref_pos += len;
                block_start = ref_pos;
                block_seq_offset = seq_offset;
            }
            Kind::Skip => {
                close_block(
                    &mut blocks,
                    &mut splice_gaps,
                    block_start,
                    ref_pos,
                    block_seq_offset,
                    &mut pending_skip,
                );
                pending_skip = Some(ref_pos);
                ref_pos += len;
                block_start = ref_pos;
                block_seq_offset = seq_offset;
            }
            Kind::HardClip | Kind::Pad => {}
        }
    }
    close_block(
        &mut blocks,
        &mut splice_gaps,
        block_start,
        ref_pos,
        block_seq_offset,
        &mut pending_skip,
    );

    if blocks.is_empty() {
        return None;
    }
    let end = ref_pos;

    let name = record
        .name()
        .map(|n| String::from_utf8_lossy(n.as_ref()).into_owned())
        .unwrap_or_default();

    let mate = record.mate_reference_sequence_id().and_then(|mate_id| {
        let (mate_name, _) = header.reference_sequences().get_index(mate_id)?;
        let mate_start = record
            .mate_alignment_start()
            .map(|p| usize::from(p) as u64 - 1)?;
        Some(MateInfo {
            chrom: Arc::from(mate_name.to_string().as_str()),
            start: mate_start,
            mapped: !flags.is_mate_unmapped(),
        })
    });

    let mut tags = rustc_hash::FxHashMap::default();
    let mut read_group = None;
    let mut sample = None;
    for (tag, value) in record.data().iter() {
        let text = match value {
            Value::Character(c) => (*c as char).to_string(),
            Value::String(s) | Value::Hex(s) => s.to_string(),
            Value::Int8(v) => v.to_string(),
            Value::UInt8(v) => v.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::UInt16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::UInt32(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Array(a) => format!("{a:?}"),
        };
        if tag == Tag::READ_GROUP {
            read_group = Some(text.clone());
        }
        tags.insert(
            String::from_utf8_lossy(tag.as_ref()).into_owned(),
            text,
        );
    }

    // sample comes from the read group's SM header field
    if let Some(rg) = &read_group {
        if let Some(map) = header.read_groups().get(rg.as_bytes()) {
            for (tag, value) in map.other_fields() {
                if tag.as_ref() == b"SM" {
                    sample = Some(value.to_string());
                }
            }
        }
    }

    Some(AlignmentRecord {
        name,
        chrom,
        start,
        end,
        strand: if flags.is_reverse_complemented() {
            Strand::Reverse
        } else {
            Strand::Forward
        },
        mapping_quality: record.mapping_quality().map(u8::from),
        flags: RecordFlags {
            paired: flags.is_segmented(),
            proper_pair: flags.is_properly_segmented(),
            secondary: flags.is_secondary(),
            duplicate: flags.is_duplicate(),
            vendor_failed: flags.is_qc_fail(),
        },
        blocks,
        splice_gaps,
        sequence: record.sequence().as_ref().to_vec(),
        read_group,
        sample,
        tags,
        mate,
        template_len: i64::from(record.template_length()),
    })
}

/// Concrete index types, so the source stays `Send` and can move to the
/// background load thread.
enum BamIndex {
    Bai(bai::Index),
    Csi(csi::Index),
}

/// Looks for `<path>.bai` then `<path>.csi` next to the file.
fn read_associated_index(path: &Path) -> Option<BamIndex> {
    let mut bai_path = path.as_os_str().to_os_string();
    bai_path.push(".bai");
    if let Ok(index) = bai::read(bai_path) {
        return Some(BamIndex::Bai(index));
    }
    let mut csi_path = path.as_os_str().to_os_string();
    csi_path.push(".csi");
    csi::read(csi_path).ok().map(BamIndex::Csi)
}

pub struct BamSource {
    path: PathBuf,
    reader: bam::io::Reader<bgzf::Reader<File>>,
    index: Option<BamIndex>,
    header: sam::Header,
}

impl BamSource {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut reader = bam::io::reader::Builder::default()
            .build_from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let header = reader.read_header()?;
        let index = read_associated_index(path);
        if index.is_none() {
            log::debug!(
                "no index found for {}, falling back to linear scans",
                path.display()
            );
        }
        Ok(BamSource {
            path: path.to_path_buf(),
            reader,
            index,
            header,
        })
    }

    /// Unindexed fallback; each query re-reads the file from the start.
    fn scan_overlapping(&self, range: &GenomicRange) -> anyhow::Result<Vec<AlignmentRecord>> {
        let mut reader = bam::io::reader::Builder::default().build_from_path(&self.path)?;
        let header = reader.read_header()?;
        let mut out = Vec::new();
        for result in reader.record_bufs(&header) {
            let record = result?;
            if let Some(rec) = convert_record(&header, &record) {
                if rec.span().overlaps(range) {
                    out.push(rec);
                }
            }
        }
        out.sort_by_key(|r| r.start);
        Ok(out)
    }
}

impl AlignmentSource for BamSource {
    fn query<'a>(
        &'a mut self,
        range: &GenomicRange,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<AlignmentRecord>> + 'a>> {
        let Some(index) = &self.index else {
            let records = self.scan_overlapping(range)?;
            return Ok(Box::new(records.into_iter().map(Ok)));
        };

        let region = region_for(range)?;
        let query = match index {
            BamIndex::Bai(index) => self.reader.query(&self.header, index, &region)?,
            BamIndex::Csi(index) => self.reader.query(&self.header, index, &region)?,
        };
        let header = self.header.clone();
        Ok(Box::new(query.filter_map(move |result| match result {
            Ok(record) => {
                match sam::alignment::RecordBuf::try_from_alignment_record(&header, &record) {
                    Ok(buf) => convert_record(&header, &buf).map(Ok),
                    Err(err) => Some(Err(err.into())),
                }
            }
            Err(err) => Some(Err(err.into())),
        })))
    }

    fn has_index(&self) -> bool {
        self.index.is_some()
    }

    fn sequence_names(&self) -> Option<Vec<String>> {
        header_sequence_names(&self.header)
    }

    fn platforms(&self) -> Option<HashSet<String>> {
        header_platforms(&self.header)
    }
}

/// Plain-text SAM; no index format exists for it here, so every query is a
/// filtering pass over the whole file.
pub struct SamSource {
    path: PathBuf,
    header: sam::Header,
}

impl SamSource {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut reader = File::open(path)
            .map(BufReader::new)
            .map(sam::io::Reader::new)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let header = reader.read_header()?;
        Ok(SamSource {
            path: path.to_path_buf(),
            header,
        })
    }
}

impl AlignmentSource for SamSource {
    fn query<'a>(
        &'a mut self,
        range: &GenomicRange,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<AlignmentRecord>> + 'a>> {
        let mut reader = File::open(&self.path)
            .map(BufReader::new)
            .map(sam::io::Reader::new)?;
        let header = reader.read_header()?;
        let mut out = Vec::new();
        for result in reader.record_bufs(&header) {
            let record = result?;
            if let Some(rec) = convert_record(&header, &record) {
                if rec.span().overlaps(range) {
                    out.push(rec);
                }
            }
        }
        out.sort_by_key(|r| r.start);
        Ok(Box::new(out.into_iter().map(Ok)))
    }

    fn has_index(&self) -> bool {
        false
    }

    fn sequence_names(&self) -> Option<Vec<String>> {
        header_sequence_names(&self.header)
    }

    fn platforms(&self) -> Option<HashSet<String>> {
        header_platforms(&self.header)
    }
}

/// In-memory source for tests and headless use. Counts queries so callers
/// can assert on single-flight behavior.
pub struct MemorySource {
    records: Vec<AlignmentRecord>,
    sequence_names: Option<Vec<String>>,
    platforms: Option<HashSet<String>>,
    queries: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(mut records: Vec<AlignmentRecord>) -> Self {
        records.sort_by(|a, b| (&a.chrom, a.start).cmp(&(&b.chrom, b.start)));
        MemorySource {
            records,
            sequence_names: None,
            platforms: None,
            queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_sequence_names(mut self, names: Vec<String>) -> Self {
        self.sequence_names = Some(names);
        self
    }

    pub fn with_platforms(mut self, platforms: HashSet<String>) -> Self {
        self.platforms = Some(platforms);
        self
    }

    /// Shared handle to the query counter; usable after the source has been
    /// boxed and handed to a loader.
    pub fn query_counter(&self) -> Arc<AtomicUsize> {
        self.queries.clone()
    }
}

impl AlignmentSource for MemorySource {
    fn query<'a>(
        &'a mut self,
        range: &GenomicRange,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<AlignmentRecord>> + 'a>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let range = range.clone();
        Ok(Box::new(
            self.records
                .iter()
                .filter(move |r| r.span().overlaps(&range))
                .cloned()
                .map(Ok),
        ))
    }

    fn has_index(&self) -> bool {
        true
    }

    fn sequence_names(&self) -> Option<Vec<String>> {
        self.sequence_names.clone()
    }

    fn platforms(&self) -> Option<HashSet<String>> {
        self.platforms.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_queries_overlap() {
        let mut source = MemorySource::new(vec![
            AlignmentRecord::new("a", "chr1", 100, 150),
            AlignmentRecord::new("b", "chr1", 300, 350),
            AlignmentRecord::new("c", "chr2", 100, 150),
        ]);
        let counter = source.query_counter();

        let hits: Vec<_> = source
            .query(&GenomicRange::new("chr1", 0, 200))
            .unwrap()
            .map(|r| r.unwrap().name)
            .collect();
        assert_eq!(hits, vec!["a"]);

        let hits: Vec<_> = source
            .query(&GenomicRange::new("chr1", 0, 1000))
            .unwrap()
            .map(|r| r.unwrap().name)
            .collect();
        assert_eq!(hits, vec!["a", "b"]);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn open_source_rejects_unknown_extension() {
        assert!(open_source("reads.cram.gz").is_err());
        assert!(open_source("reads.vcf").is_err());
    }

    // sources cross to the background load thread, so every implementation
    // has to be Send
    #[test]
    fn sources_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<BamSource>();
        assert_send::<SamSource>();
        assert_send::<MemorySource>();
        assert_send::<Box<dyn AlignmentSource>>();
    }
}
