use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alignment::AlignmentRecord;
use crate::range::GenomicRange;

/// Downsampling settings, snapshotted from preferences at load time.
#[derive(Debug, Clone, Copy)]
pub struct DownsampleOptions {
    pub enabled: bool,
    /// Window size in bp; windows partition the reference, aligned to
    /// multiples of this size.
    pub sample_window_size: u64,
    /// Max records retained per window when enabled.
    pub max_read_count: usize,
}

impl Default for DownsampleOptions {
    fn default() -> Self {
        DownsampleOptions {
            enabled: true,
            sample_window_size: 50,
            max_read_count: 100,
        }
    }
}

/// Records that `count` records overlapping `range` were omitted by
/// downsampling; kept for coverage accounting and UI indication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownsampledInterval {
    pub range: GenomicRange,
    pub count: u32,
}

/// Replacement rule applied when a record arrives at a full sampling window.
///
/// `seen` counts every record offered to the window so far, including the
/// arriving one; `cap` is the retained-record bound. Returning
/// `Some(index)` replaces the staged record at that index, `None` drops the
/// arriving record. Injectable so sampling stays checkable in tests.
pub trait ReservoirPolicy: Send {
    fn replace_index(&mut self, seen: usize, cap: usize) -> Option<usize>;
}

/// Classic uniform reservoir sampling: every record seen in a window has an
/// equal chance of being retained.
pub struct UniformReservoir {
    rng: StdRng,
}

impl UniformReservoir {
    pub fn new() -> Self {
        UniformReservoir {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        UniformReservoir {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for UniformReservoir {
    fn default() -> Self {
        Self::new()
    }
}

impl ReservoirPolicy for UniformReservoir {
    fn replace_index(&mut self, seen: usize, cap: usize) -> Option<usize> {
        let j = self.rng.gen_range(0..seen);
        (j < cap).then_some(j)
    }
}

/// Deterministic policy retaining the first `cap` records of each window.
pub struct KeepFirst;

impl ReservoirPolicy for KeepFirst {
    fn replace_index(&mut self, _seen: usize, _cap: usize) -> Option<usize> {
        None
    }
}

/// Applies a `ReservoirPolicy` over fixed-size windows of records arriving
/// in ascending start order, accumulating retained records and one
/// `DownsampledInterval` per overflowed window.
pub struct WindowSampler<'a> {
    options: DownsampleOptions,
    policy: &'a mut dyn ReservoirPolicy,

    window_start: u64,
    window_chrom: Option<Arc<str>>,
    staged: Vec<Arc<AlignmentRecord>>,
    seen_in_window: usize,

    retained: Vec<Arc<AlignmentRecord>>,
    markers: Vec<DownsampledInterval>,
}

impl<'a> WindowSampler<'a> {
    pub fn new(options: DownsampleOptions, policy: &'a mut dyn ReservoirPolicy) -> Self {
        WindowSampler {
            options,
            policy,
            window_start: 0,
            window_chrom: None,
            staged: Vec::new(),
            seen_in_window: 0,
            retained: Vec::new(),
            markers: Vec::new(),
        }
    }

    pub fn offer(&mut self, record: Arc<AlignmentRecord>) {
        if !self.options.enabled {
            self.retained.push(record);
            return;
        }

        let w = self.options.sample_window_size.max(1);
        let window_start = (record.start / w) * w;

        if self.window_chrom.as_deref() != Some(&record.chrom) || window_start != self.window_start
        {
            self.flush_window();
            self.window_chrom = Some(record.chrom.clone());
            self.window_start = window_start;
        }

        self.seen_in_window += 1;
        if self.staged.len() < self.options.max_read_count {
            self.staged.push(record);
        } else if let Some(i) = self
            .policy
            .replace_index(self.seen_in_window, self.options.max_read_count)
        {
            self.staged[i] = record;
        }
    }

    fn flush_window(&mut self) {
        let kept = self.staged.len();
        if self.seen_in_window > kept {
            let chrom = self.window_chrom.clone().expect("overflowed empty window");
            let start = self.window_start;
            let end = start + self.options.sample_window_size.max(1);
            self.markers.push(DownsampledInterval {
                range: GenomicRange::new(chrom, start, end),
                count: (self.seen_in_window - kept) as u32,
            });
        }
        // replacement can reorder within the window
        self.staged.sort_by_key(|r| r.start);
        self.retained.append(&mut self.staged);
        self.seen_in_window = 0;
    }

    pub fn finish(mut self) -> (Vec<Arc<AlignmentRecord>>, Vec<DownsampledInterval>) {
        self.flush_window();
        (self.retained, self.markers)
    }
}
