use std::cmp::Ordering;

use crate::alignment::Strand;
use crate::packer::{PackedAlignments, Row};

/// What a row's comparison key is derived from. The pivot location selects
/// the occupant the key is read off of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOption {
    /// Base call at the pivot location.
    Base,
    /// Mapping quality.
    Quality,
    /// Absolute template length.
    InsertSize,
    /// Mate chromosome name.
    MateChromosome,
    Strand,
    /// Value of the tag passed alongside.
    Tag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Comparison key for one row. Numeric where the attribute is numeric,
/// textual otherwise; one sort pass only ever mixes the two for tag values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Int(i64),
    Text(String),
}

/// Pure key function: the key for `row` under `option` at `pivot`, or
/// `None` when no occupant spans the pivot (such rows sort last in either
/// direction, keeping empty-lane placement predictable). Keys are computed
/// fresh on every sort and never stored on the row.
pub fn row_sort_key(row: &Row, option: SortOption, pivot: u64, tag: Option<&str>) -> Option<SortKey> {
    let feature = row.feature_at(pivot)?;
    // for pairs, read the key off the mate actually under the pivot
    let record = feature
        .records()
        .find(|r| pivot >= r.start && pivot < r.end)
        .map(|r| r.as_ref())
        .unwrap_or(feature.primary());

    match option {
        SortOption::Base => record
            .base_at(pivot)
            .map(|b| SortKey::Text((b.to_ascii_uppercase() as char).to_string())),
        SortOption::Quality => Some(SortKey::Int(
            record.mapping_quality.map(i64::from).unwrap_or(0),
        )),
        SortOption::InsertSize => Some(SortKey::Int(record.template_len.abs())),
        SortOption::MateChromosome => record
            .mate
            .as_ref()
            .filter(|m| m.mapped)
            .map(|m| SortKey::Text(m.chrom.to_string())),
        SortOption::Strand => Some(SortKey::Int(match record.strand {
            Strand::Forward => 0,
            Strand::Reverse => 1,
        })),
        SortOption::Tag => {
            let value = record.tag(tag?)?;
            Some(match value.parse::<i64>() {
                Ok(n) => SortKey::Int(n),
                Err(_) => SortKey::Text(value.to_string()),
            })
        }
    }
}

/// Recompute every row's key and stably reorder rows within each group.
/// Only row order changes; record-to-row assignment never does.
pub fn sort_rows(
    packed: &mut PackedAlignments,
    option: SortOption,
    pivot: u64,
    tag: Option<&str>,
    order: SortOrder,
) {
    for (_, rows) in packed.groups_mut() {
        let mut keyed: Vec<(Option<SortKey>, Row)> = rows
            .drain(..)
            .map(|row| (row_sort_key(&row, option, pivot, tag), row))
            .collect();

        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let ord = a.cmp(b);
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            }
        });

        rows.extend(keyed.into_iter().map(|(_, row)| row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{AlignmentRecord, MateInfo, PackedFeature};
    use std::sync::Arc;

    fn row_of(records: Vec<AlignmentRecord>) -> Row {
        Row {
            features: records
                .into_iter()
                .map(|r| PackedFeature::Single(Arc::new(r)))
                .collect(),
        }
    }

    fn packed_of(rows: Vec<Row>) -> PackedAlignments {
        let mut packed = PackedAlignments::default();
        *packed.rows_for(String::new()) = rows;
        packed
    }

    fn with_quality(name: &str, mapq: u8) -> AlignmentRecord {
        let mut rec = AlignmentRecord::new(name, "chr1", 100, 200);
        rec.mapping_quality = Some(mapq);
        rec
    }

    fn row_names(packed: &PackedAlignments) -> Vec<String> {
        packed
            .groups()
            .flat_map(|(_, rows)| rows)
            .map(|row| row.features[0].primary().name.clone())
            .collect()
    }

    #[test]
    fn quality_sort_both_directions() {
        let rows = vec![
            row_of(vec![with_quality("mid", 30)]),
            row_of(vec![with_quality("low", 10)]),
            row_of(vec![with_quality("high", 60)]),
        ];
        let mut packed = packed_of(rows.clone());
        sort_rows(&mut packed, SortOption::Quality, 150, None, SortOrder::Ascending);
        assert_eq!(row_names(&packed), vec!["low", "mid", "high"]);

        let mut packed = packed_of(rows);
        sort_rows(&mut packed, SortOption::Quality, 150, None, SortOrder::Descending);
        assert_eq!(row_names(&packed), vec!["high", "mid", "low"]);
    }

    #[test]
    fn rows_missing_the_pivot_sort_last() {
        // "away" doesn't span the pivot at 150
        let rows = vec![
            row_of(vec![AlignmentRecord::new("away", "chr1", 500, 600)]),
            row_of(vec![with_quality("b", 20)]),
            row_of(vec![with_quality("a", 10)]),
        ];
        let mut packed = packed_of(rows.clone());
        sort_rows(&mut packed, SortOption::Quality, 150, None, SortOrder::Ascending);
        assert_eq!(row_names(&packed), vec!["a", "b", "away"]);

        let mut packed = packed_of(rows);
        sort_rows(&mut packed, SortOption::Quality, 150, None, SortOrder::Descending);
        assert_eq!(row_names(&packed), vec!["b", "a", "away"]);
    }

    #[test]
    fn equal_keys_preserve_input_order() {
        let rows = vec![
            row_of(vec![with_quality("first", 30)]),
            row_of(vec![with_quality("second", 30)]),
            row_of(vec![with_quality("third", 30)]),
        ];
        let mut packed = packed_of(rows);
        sort_rows(&mut packed, SortOption::Quality, 150, None, SortOrder::Ascending);
        assert_eq!(row_names(&packed), vec!["first", "second", "third"]);

        // idempotent: re-sorting with an unchanged key set is a no-op
        sort_rows(&mut packed, SortOption::Quality, 150, None, SortOrder::Ascending);
        assert_eq!(row_names(&packed), vec!["first", "second", "third"]);
    }

    #[test]
    fn base_sort_reads_the_pivot_column() {
        let mut t = AlignmentRecord::new("t", "chr1", 100, 104);
        t.sequence = b"TTTT".to_vec();
        let mut a = AlignmentRecord::new("a", "chr1", 100, 104);
        a.sequence = b"AAAA".to_vec();
        let mut g = AlignmentRecord::new("g", "chr1", 100, 104);
        g.sequence = b"gggg".to_vec(); // case-insensitive

        let mut packed = packed_of(vec![row_of(vec![t]), row_of(vec![a]), row_of(vec![g])]);
        sort_rows(&mut packed, SortOption::Base, 102, None, SortOrder::Ascending);
        assert_eq!(row_names(&packed), vec!["a", "g", "t"]);
    }

    #[test]
    fn tag_sort_is_numeric_when_possible() {
        let mut r2 = AlignmentRecord::new("r2", "chr1", 100, 200);
        r2.tags.insert("HP".into(), "2".into());
        let mut r10 = AlignmentRecord::new("r10", "chr1", 100, 200);
        r10.tags.insert("HP".into(), "10".into());
        let untagged = AlignmentRecord::new("none", "chr1", 100, 200);

        let mut packed = packed_of(vec![
            row_of(vec![r10]),
            row_of(vec![untagged]),
            row_of(vec![r2]),
        ]);
        sort_rows(&mut packed, SortOption::Tag, 150, Some("HP"), SortOrder::Ascending);
        // numeric order (2 < 10), untagged row last
        assert_eq!(row_names(&packed), vec!["r2", "r10", "none"]);
    }

    #[test]
    fn mate_chromosome_sort() {
        let mate = |name: &str, chrom: &str| {
            let mut rec = AlignmentRecord::new(name, "chr1", 100, 200);
            rec.mate = Some(MateInfo {
                chrom: chrom.into(),
                start: 0,
                mapped: true,
            });
            rec
        };
        let mut packed = packed_of(vec![
            row_of(vec![mate("b", "chr9")]),
            row_of(vec![mate("a", "chr2")]),
        ]);
        sort_rows(
            &mut packed,
            SortOption::MateChromosome,
            150,
            None,
            SortOrder::Ascending,
        );
        assert_eq!(row_names(&packed), vec!["a", "b"]);
    }
}
