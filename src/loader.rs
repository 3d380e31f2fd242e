use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::alignment::AlignmentRecord;
use crate::coverage::Coverage;
use crate::pestats::{PeStatsMap, DEFAULT_READ_GROUP};
use crate::range::GenomicRange;
use crate::sample::{DownsampleOptions, DownsampledInterval, ReservoirPolicy, WindowSampler};
use crate::source::AlignmentSource;
use crate::splice::{SpliceJunction, SpliceJunctionCollector, SpliceLoadOptions};

/// Signal that an in-flight load was abandoned via the cancellation switch.
/// Not a data error; no data from the cancelled load is trusted, and prior
/// cache state stands. Surfaced through `anyhow` so callers can downcast.
#[derive(Debug, Clone, Copy)]
pub struct LoadCancelled;

impl std::fmt::Display for LoadCancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("alignment load cancelled")
    }
}

impl std::error::Error for LoadCancelled {}

/// Process-wide switch aborting all in-flight source reads.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a single tile load reads from configuration, snapshotted up
/// front so a preference change mid-load can't tear the tile.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub downsample: DownsampleOptions,
    pub splice: SpliceLoadOptions,
    pub coverage_by_strand: bool,
    pub filter_duplicates: bool,
    pub filter_vendor_failed: bool,
}

/// Raw product of one tile load, before it is frozen into an
/// `AlignmentInterval`.
#[derive(Debug)]
pub struct AlignmentTile {
    pub range: GenomicRange,
    pub records: Vec<Arc<AlignmentRecord>>,
    pub coverage: Coverage,
    pub junctions: Vec<SpliceJunction>,
    pub downsampled: Vec<DownsampledInterval>,
}

/// Fetches raw records for a range from the alignment source and turns them
/// into a tile: downsampled record set, per-base coverage, splice-junction
/// evidence, and paired-end stats updates.
pub struct TileLoader {
    source: Box<dyn AlignmentSource>,
    paired_end: bool,
}

impl TileLoader {
    pub fn new(source: Box<dyn AlignmentSource>) -> Self {
        TileLoader {
            source,
            paired_end: false,
        }
    }

    pub fn has_index(&self) -> bool {
        self.source.has_index()
    }

    pub fn sequence_names(&self) -> Option<Vec<String>> {
        self.source.sequence_names()
    }

    pub fn platforms(&self) -> Option<HashSet<String>> {
        self.source.platforms()
    }

    /// Whether any record seen so far was paired; meaningful once at least
    /// one tile has loaded.
    pub fn is_paired_end(&self) -> bool {
        self.paired_end
    }

    pub fn load_tile(
        &mut self,
        range: &GenomicRange,
        options: &LoadOptions,
        pe_stats: &mut PeStatsMap,
        policy: &mut dyn ReservoirPolicy,
        cancel: &CancelFlag,
    ) -> anyhow::Result<AlignmentTile> {
        let mut sampler = WindowSampler::new(options.downsample, policy);

        let records = self.source.query(range)?;
        let mut paired_end = false;
        for result in records {
            if cancel.is_cancelled() {
                return Err(LoadCancelled.into());
            }
            let record = result?;

            if record.flags.secondary
                || (options.filter_duplicates && record.flags.duplicate)
                || (options.filter_vendor_failed && record.flags.vendor_failed)
            {
                continue;
            }

            paired_end |= record.flags.paired;

            // insert-size stats accumulate over every record seen, not just
            // the downsampled survivors
            if record.is_proper_pair() && record.template_len != 0 {
                let key = record
                    .read_group
                    .as_deref()
                    .unwrap_or(DEFAULT_READ_GROUP)
                    .to_string();
                pe_stats.entry(key).or_default().record(record.template_len);
            }

            sampler.offer(Arc::new(record));
        }
        self.paired_end |= paired_end;

        let (records, downsampled) = sampler.finish();

        let mut coverage = Coverage::new(range.clone(), options.coverage_by_strand);
        let mut junctions = SpliceJunctionCollector::new(options.splice);
        for record in &records {
            coverage.increment(record);
            junctions.add(record);
        }

        Ok(AlignmentTile {
            range: range.clone(),
            records,
            coverage,
            junctions: junctions.materialize(),
            downsampled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::RecordFlags;
    use crate::sample::KeepFirst;
    use crate::source::MemorySource;

    fn paired(name: &str, start: u64, tlen: i64, rg: Option<&str>) -> AlignmentRecord {
        let mut rec = AlignmentRecord::new(name, "chr1", start, start + 50);
        rec.flags = RecordFlags {
            paired: true,
            proper_pair: true,
            ..Default::default()
        };
        rec.template_len = tlen;
        rec.read_group = rg.map(String::from);
        rec
    }

    fn load(
        records: Vec<AlignmentRecord>,
        range: &GenomicRange,
        options: &LoadOptions,
    ) -> (AlignmentTile, PeStatsMap) {
        let mut loader = TileLoader::new(Box::new(MemorySource::new(records)));
        let mut pe_stats = PeStatsMap::default();
        let mut policy = KeepFirst;
        let tile = loader
            .load_tile(range, options, &mut pe_stats, &mut policy, &CancelFlag::default())
            .unwrap();
        (tile, pe_stats)
    }

    #[test]
    fn tile_gathers_coverage_and_stats() {
        let records = vec![
            paired("a", 100, 300, Some("rg1")),
            paired("b", 120, -310, Some("rg1")),
            paired("c", 400, 280, None),
        ];
        let range = GenomicRange::new("chr1", 0, 1000);
        let options = LoadOptions {
            downsample: DownsampleOptions {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let (tile, pe_stats) = load(records, &range, &options);

        assert_eq!(tile.records.len(), 3);
        assert_eq!(tile.coverage.depth_at(130), 2);
        assert!(tile.downsampled.is_empty());

        assert_eq!(pe_stats["rg1"].sample_count(), 2);
        assert_eq!(pe_stats[DEFAULT_READ_GROUP].sample_count(), 1);
    }

    #[test]
    fn filtered_records_do_not_count() {
        let mut dup = paired("dup", 100, 200, None);
        dup.flags.duplicate = true;
        let mut sec = paired("sec", 110, 200, None);
        sec.flags.secondary = true;

        let range = GenomicRange::new("chr1", 0, 1000);
        let options = LoadOptions {
            filter_duplicates: true,
            filter_vendor_failed: true,
            downsample: DownsampleOptions {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let (tile, pe_stats) = load(vec![dup, sec, paired("ok", 120, 250, None)], &range, &options);

        assert_eq!(tile.records.len(), 1);
        assert_eq!(tile.coverage.depth_at(125), 1);
        assert_eq!(pe_stats[DEFAULT_READ_GROUP].sample_count(), 1);
    }

    #[test]
    fn downsampling_bounds_the_tile() {
        // scenario: window=50, cap=2, three records in one window
        let records = vec![
            AlignmentRecord::new("a", "chr1", 100, 130),
            AlignmentRecord::new("b", "chr1", 110, 140),
            AlignmentRecord::new("c", "chr1", 120, 150),
        ];
        let range = GenomicRange::new("chr1", 0, 1000);
        let options = LoadOptions {
            downsample: DownsampleOptions {
                enabled: true,
                sample_window_size: 50,
                max_read_count: 2,
            },
            ..Default::default()
        };
        let (tile, _) = load(records, &range, &options);

        assert_eq!(tile.records.len(), 2);
        assert_eq!(tile.downsampled.len(), 1);
        assert_eq!(tile.downsampled[0].count, 1);
        // coverage reflects only the retained records
        assert_eq!(tile.coverage.depth_at(125), 2);
    }

    #[test]
    fn junctions_materialize_through_the_loader() {
        let records = vec![
            AlignmentRecord::with_exons("a", "chr1", &[(100, 150), (250, 300)]),
            AlignmentRecord::with_exons("b", "chr1", &[(90, 150), (250, 320)]),
        ];
        let range = GenomicRange::new("chr1", 0, 1000);
        let options = LoadOptions {
            splice: SpliceLoadOptions {
                min_junction_coverage: 2,
                min_read_flanking_width: 10,
            },
            downsample: DownsampleOptions {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let (tile, _) = load(records, &range, &options);

        assert_eq!(tile.junctions.len(), 1);
        assert_eq!((tile.junctions[0].start, tile.junctions[0].end), (150, 250));
    }

    #[test]
    fn cancellation_aborts_early() {
        let records = (0..100)
            .map(|i| AlignmentRecord::new(format!("r{i}"), "chr1", i * 10, i * 10 + 50))
            .collect();
        let mut loader = TileLoader::new(Box::new(MemorySource::new(records)));
        let cancel = CancelFlag::default();
        cancel.cancel();

        let mut pe_stats = PeStatsMap::default();
        let mut policy = KeepFirst;
        let err = loader
            .load_tile(
                &GenomicRange::new("chr1", 0, 10_000),
                &LoadOptions::default(),
                &mut pe_stats,
                &mut policy,
                &cancel,
            )
            .unwrap_err();

        assert!(err.is::<LoadCancelled>());
    }
}
