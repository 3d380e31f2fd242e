use rustc_hash::FxHashMap;

use crate::alignment::{PackedFeature, PairedFeature};
use crate::config::{GroupOption, RenderOptions};
use crate::interval::AlignmentInterval;
use crate::range::GenomicRange;

/// Minimum bp between the end of one lane occupant and the start of the
/// next in the same row.
pub const MIN_ALIGNMENT_SPACING: u64 = 2;

/// Bucket for occupants whose grouping attribute is absent.
pub const UNGROUPED: &str = "Ungrouped";

/// One display lane: occupants in ascending start order, pairwise
/// non-overlapping (with the minimum spacing between neighbors).
#[derive(Debug, Clone, Default)]
pub struct Row {
    pub features: Vec<PackedFeature>,
}

impl Row {
    pub fn start(&self) -> Option<u64> {
        self.features.first().map(|f| f.start())
    }

    pub fn end(&self) -> Option<u64> {
        self.features.last().map(|f| f.end())
    }

    /// The occupant spanning `pos`, if any.
    pub fn feature_at(&self, pos: u64) -> Option<&PackedFeature> {
        self.features.iter().find(|f| f.spans_pos(pos))
    }
}

/// Rows grouped by the configured group key, group order matching the
/// first-seen order of each key. Rebuilt wholesale on any option change or
/// new load, never incrementally updated.
#[derive(Debug, Clone, Default)]
pub struct PackedAlignments {
    groups: Vec<(String, Vec<Row>)>,
    index: FxHashMap<String, usize>,
    /// Ranges of the intervals this packing was built from.
    ranges: Vec<GenomicRange>,
    /// The options this packing was built under; a mismatch with the
    /// caller's current options makes the entry stale.
    options: RenderOptions,
    dropped: usize,
}

impl PackedAlignments {
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[Row])> {
        self.groups.iter().map(|(k, rows)| (k.as_str(), rows.as_slice()))
    }

    pub fn groups_mut(&mut self) -> impl Iterator<Item = (&str, &mut Vec<Row>)> {
        self.groups.iter_mut().map(|(k, rows)| (k.as_str(), rows))
    }

    pub fn group(&self, key: &str) -> Option<&[Row]> {
        self.index.get(key).map(|&i| self.groups[i].1.as_slice())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total lane count across all groups (display height).
    pub fn n_levels(&self) -> usize {
        self.groups.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn record_count(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|(_, rows)| rows)
            .flat_map(|row| &row.features)
            .map(|f| f.records().count())
            .sum()
    }

    /// Occupants dropped by the row-count cap.
    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn contains(&self, query: &GenomicRange) -> bool {
        self.ranges.iter().any(|r| r.contains(query))
    }

    pub(crate) fn rows_for(&mut self, key: String) -> &mut Vec<Row> {
        let i = *self.index.entry(key.clone()).or_insert_with(|| {
            self.groups.push((key, Vec::new()));
            self.groups.len() - 1
        });
        &mut self.groups[i].1
    }
}

fn group_key(feature: &PackedFeature, option: &GroupOption) -> String {
    let record = feature.primary();
    let attr = match option {
        GroupOption::None => return String::new(),
        GroupOption::Strand => return record.strand.to_string(),
        GroupOption::Sample => record.sample.clone(),
        GroupOption::ReadGroup => record.read_group.clone(),
        GroupOption::Tag(tag) => record.tag(tag).map(String::from),
        GroupOption::MateChromosome => record
            .mate
            .as_ref()
            .filter(|m| m.mapped)
            .map(|m| m.chrom.to_string()),
    };
    attr.unwrap_or_else(|| UNGROUPED.to_string())
}

/// Coalesce mates sharing a read name into pair features; anything
/// unpairable stays a standalone occupant.
fn pair_features<'a>(intervals: &[&'a AlignmentInterval]) -> Vec<PackedFeature> {
    let mut features: Vec<PackedFeature> = Vec::new();
    let mut open_pairs: FxHashMap<&'a str, usize> = FxHashMap::default();

    for interval in intervals {
        for record in interval.records() {
            let pairable = record.is_proper_pair()
                && record
                    .mate
                    .as_ref()
                    .is_some_and(|m| m.mapped && m.chrom == record.chrom);

            if !pairable {
                features.push(PackedFeature::Single(record.clone()));
                continue;
            }

            match open_pairs.get(record.name.as_str()) {
                Some(&i) => {
                    if let PackedFeature::Pair(pair) = &mut features[i] {
                        if pair.second.is_none() {
                            pair.second = Some(record.clone());
                            continue;
                        }
                    }
                    // more than two records under one name; keep the extras standalone
                    features.push(PackedFeature::Single(record.clone()));
                }
                None => {
                    features.push(PackedFeature::Pair(PairedFeature {
                        first: record.clone(),
                        second: None,
                    }));
                    open_pairs.insert(record.name.as_str(), features.len() - 1);
                }
            }
        }
    }
    features
}

/// Greedy bin-packing of alignments into non-overlapping display lanes,
/// grouped by the configured key. `intervals` carries one interval per
/// synchronized viewport.
pub fn pack(intervals: &[&AlignmentInterval], options: &RenderOptions) -> PackedAlignments {
    let features = if options.view_as_pairs {
        pair_features(intervals)
    } else {
        intervals
            .iter()
            .flat_map(|iv| iv.records())
            .map(|r| PackedFeature::Single(r.clone()))
            .collect()
    };

    // group, preserving first-seen key order
    let mut packed = PackedAlignments {
        ranges: intervals.iter().map(|iv| iv.range().clone()).collect(),
        options: options.clone(),
        ..Default::default()
    };
    let mut grouped: Vec<(String, Vec<(usize, PackedFeature)>)> = Vec::new();
    let mut group_index: FxHashMap<String, usize> = FxHashMap::default();
    for (i, feature) in features.into_iter().enumerate() {
        let key = group_key(&feature, &options.group_by);
        let gi = *group_index.entry(key.clone()).or_insert_with(|| {
            grouped.push((key, Vec::new()));
            grouped.len() - 1
        });
        grouped[gi].1.push((i, feature));
    }

    for (key, mut members) in grouped {
        // stable order: start position, then original source order
        members.sort_by_key(|(i, f)| (f.start(), *i));

        let rows = packed.rows_for(key);
        let mut dropped = 0usize;
        for (_, feature) in members {
            let start = feature.start();
            let slot = rows.iter().position(|row| {
                row.end()
                    .is_some_and(|end| end + MIN_ALIGNMENT_SPACING <= start)
            });
            match slot {
                Some(i) => rows[i].features.push(feature),
                None if rows.len() < options.max_rows => {
                    rows.push(Row {
                        features: vec![feature],
                    });
                }
                // density cap reached; the occupant is dropped from packing
                // (coverage and stats were captured independently)
                None => dropped += 1,
            }
        }
        packed.dropped += dropped;
    }

    packed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{AlignmentRecord, MateInfo, RecordFlags, Strand};
    use crate::config::RenderOptions;
    use crate::coverage::Coverage;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn interval(records: Vec<AlignmentRecord>, range: GenomicRange) -> AlignmentInterval {
        let coverage = Coverage::new(range.clone(), false);
        AlignmentInterval::new(
            range,
            records.into_iter().map(Arc::new).collect(),
            coverage,
            Vec::new(),
            Vec::new(),
        )
    }

    fn rec(name: &str, start: u64, end: u64) -> AlignmentRecord {
        AlignmentRecord::new(name, "chr1", start, end)
    }

    #[test]
    fn overlapping_records_go_to_different_rows() {
        // A=[100,150), B=[120,180), C=[200,250): A and B collide, C reuses A's row
        let iv = interval(
            vec![rec("a", 100, 150), rec("b", 120, 180), rec("c", 200, 250)],
            GenomicRange::new("chr1", 0, 1000),
        );
        let packed = pack(&[&iv], &RenderOptions::default());

        assert_eq!(packed.group_count(), 1);
        let rows = packed.group("").unwrap();
        assert_eq!(rows.len(), 2);

        let names: Vec<Vec<&str>> = rows
            .iter()
            .map(|row| {
                row.features
                    .iter()
                    .map(|f| f.primary().name.as_str())
                    .collect()
            })
            .collect();
        assert_eq!(names, vec![vec!["a", "c"], vec!["b"]]);
    }

    #[test]
    fn packing_conserves_records() {
        proptest!(|(spans in proptest::collection::vec((0u64..5000, 1u64..300), 0..120))| {
            let records: Vec<_> = spans
                .iter()
                .enumerate()
                .map(|(i, &(start, len))| rec(&format!("r{i}"), start, start + len))
                .collect();
            let n = records.len();
            let iv = interval(records, GenomicRange::new("chr1", 0, 6000));
            let packed = pack(&[&iv], &RenderOptions::default());

            // conservation: every input record lands in exactly one row
            prop_assert_eq!(packed.record_count() + packed.dropped_count(), n);
            let mut seen = std::collections::HashSet::new();
            for (_, rows) in packed.groups() {
                for row in rows {
                    for f in &row.features {
                        prop_assert!(seen.insert(f.primary().name.clone()));
                    }
                }
            }

            // non-overlap within each row
            for (_, rows) in packed.groups() {
                for row in rows {
                    for pair in row.features.windows(2) {
                        prop_assert!(pair[0].end() + MIN_ALIGNMENT_SPACING <= pair[1].start());
                    }
                }
            }
        });
    }

    #[test]
    fn row_cap_drops_the_rest() {
        // ten mutually overlapping records, two rows allowed
        let records: Vec<_> = (0..10).map(|i| rec(&format!("r{i}"), 100, 200)).collect();
        let iv = interval(records, GenomicRange::new("chr1", 0, 1000));
        let options = RenderOptions {
            max_rows: 2,
            ..Default::default()
        };
        let packed = pack(&[&iv], &options);

        assert_eq!(packed.n_levels(), 2);
        assert_eq!(packed.record_count(), 2);
        assert_eq!(packed.dropped_count(), 8);
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let mut a = rec("a", 100, 150);
        a.tags.insert("HP".into(), "2".into());
        let mut b = rec("b", 120, 170);
        b.tags.insert("HP".into(), "1".into());
        let c = rec("c", 140, 190); // no HP tag

        let iv = interval(vec![a, b, c], GenomicRange::new("chr1", 0, 1000));
        let options = RenderOptions {
            group_by: GroupOption::Tag("HP".into()),
            ..Default::default()
        };
        let packed = pack(&[&iv], &options);

        let keys: Vec<&str> = packed.groups().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["2", "1", UNGROUPED]);
    }

    #[test]
    fn grouping_by_strand() {
        let mut r = rec("r", 100, 150);
        r.strand = Strand::Reverse;
        let iv = interval(vec![rec("f", 100, 150), r], GenomicRange::new("chr1", 0, 1000));
        let options = RenderOptions {
            group_by: GroupOption::Strand,
            ..Default::default()
        };
        let packed = pack(&[&iv], &options);
        assert_eq!(packed.group_count(), 2);
        assert_eq!(packed.group("+").unwrap().len(), 1);
        assert_eq!(packed.group("-").unwrap().len(), 1);
    }

    fn mate_of(name: &str, start: u64, end: u64, mate_start: u64) -> AlignmentRecord {
        let mut r = rec(name, start, end);
        r.flags = RecordFlags {
            paired: true,
            proper_pair: true,
            ..Default::default()
        };
        r.mate = Some(MateInfo {
            chrom: r.chrom.clone(),
            start: mate_start,
            mapped: true,
        });
        r
    }

    #[test]
    fn view_as_pairs_coalesces_mates() {
        let first = mate_of("p", 100, 150, 400);
        let second = mate_of("p", 400, 450, 100);
        let lone = mate_of("q", 200, 250, 5000); // mate out of the loaded range

        let iv = interval(vec![first, lone, second], GenomicRange::new("chr1", 0, 1000));
        let options = RenderOptions {
            view_as_pairs: true,
            ..Default::default()
        };
        let packed = pack(&[&iv], &options);

        let rows = packed.group("").unwrap();
        // p spans [100,450) and q sits inside it, so two rows
        assert_eq!(rows.len(), 2);
        assert_eq!(packed.record_count(), 3);

        let pair = rows
            .iter()
            .flat_map(|r| &r.features)
            .find(|f| matches!(f, PackedFeature::Pair(p) if p.second.is_some()))
            .unwrap();
        assert_eq!((pair.start(), pair.end()), (100, 450));
    }

    #[test]
    fn packing_spans_multiple_intervals() {
        let iv1 = interval(vec![rec("a", 100, 150)], GenomicRange::new("chr1", 0, 500));
        let iv2 = interval(vec![rec("b", 700, 750)], GenomicRange::new("chr1", 600, 900));
        let packed = pack(&[&iv1, &iv2], &RenderOptions::default());

        assert_eq!(packed.record_count(), 2);
        assert!(packed.contains(&GenomicRange::new("chr1", 100, 200)));
        assert!(packed.contains(&GenomicRange::new("chr1", 650, 800)));
        assert!(!packed.contains(&GenomicRange::new("chr1", 500, 600)));
    }
}
