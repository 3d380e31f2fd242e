use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

/// Insert-size samples kept per read group. Bounded so a deep pileup can't
/// grow the buffer without limit; past the bound new samples randomly
/// replace old ones, keeping the distribution representative.
const MAX_SAMPLES: usize = 10_000;

#[derive(Debug)]
pub struct PeStats {
    samples: Vec<u64>,
    seen: usize,
    rng: StdRng,

    min_threshold: Option<u64>,
    max_threshold: Option<u64>,
}

impl Default for PeStats {
    fn default() -> Self {
        PeStats {
            samples: Vec::new(),
            seen: 0,
            rng: StdRng::from_entropy(),
            min_threshold: None,
            max_threshold: None,
        }
    }
}

impl PeStats {
    /// Record the template length of one properly-paired record.
    pub fn record(&mut self, template_length: i64) {
        let value = template_length.unsigned_abs();
        self.seen += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(value);
        } else {
            let j = self.rng.gen_range(0..self.seen);
            if j < MAX_SAMPLES {
                self.samples[j] = value;
            }
        }
    }

    /// Recompute the low/high insert-size thresholds from the accumulated
    /// samples at the given percentiles (0..=100).
    pub fn compute(&mut self, min_percentile: f64, max_percentile: f64) {
        if self.samples.is_empty() {
            self.min_threshold = None;
            self.max_threshold = None;
            return;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        self.min_threshold = Some(nearest_rank(&sorted, min_percentile));
        self.max_threshold = Some(nearest_rank(&sorted, max_percentile));
    }

    pub fn min_threshold(&self) -> Option<u64> {
        self.min_threshold
    }

    pub fn max_threshold(&self) -> Option<u64> {
        self.max_threshold
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

fn nearest_rank(sorted: &[u64], percentile: f64) -> u64 {
    let p = percentile.clamp(0.0, 100.0);
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Running stats per read group; records without one land under a shared
/// default key.
pub type PeStatsMap = FxHashMap<String, PeStats>;

pub const DEFAULT_READ_GROUP: &str = "";
