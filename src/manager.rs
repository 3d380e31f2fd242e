use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crossbeam::channel::{self, Receiver, Sender};
use rustc_hash::FxHashMap;

use crate::cache::RangeCache;
use crate::config::{Preferences, RenderOptions};
use crate::interval::AlignmentInterval;
use crate::loader::{CancelFlag, LoadCancelled, TileLoader};
use crate::packer::{self, PackedAlignments};
use crate::pestats::PeStatsMap;
use crate::range::GenomicRange;
use crate::sample::{ReservoirPolicy, UniformReservoir};
use crate::sort::{self, SortOption, SortOrder};
use crate::source::AlignmentSource;
use crate::view::{Viewport, ViewportId};

/// Published to subscribers when a load for a viewport has completed and
/// its caches are populated.
#[derive(Debug, Clone)]
pub struct DataLoadedEvent {
    pub viewport: ViewportId,
    pub range: GenomicRange,
}

/// The manager's "current in-flight load" slot. At most one load runs per
/// manager; a second request while one is active is dropped, not queued,
/// and the caller re-issues after completion. The guard returns the slot
/// to idle when dropped, on success and failure paths alike.
#[derive(Default)]
struct SingleFlight {
    loading: Mutex<bool>,
}

impl SingleFlight {
    fn try_begin(self: &Arc<Self>) -> Option<FlightGuard> {
        let mut loading = self.loading.lock().unwrap();
        if *loading {
            None
        } else {
            *loading = true;
            Some(FlightGuard(self.clone()))
        }
    }
}

struct FlightGuard(Arc<SingleFlight>);

impl Drop for FlightGuard {
    fn drop(&mut self) {
        *self.0.loading.lock().unwrap() = false;
    }
}

/// Turns viewport requests into cached, packed, render-ready alignment
/// data: a containment-indexed interval cache, a packed-alignments cache,
/// single-flight load orchestration, and completion notifications.
///
/// Interval values are immutable once cached; a cache write replaces the
/// slot's `Arc` wholesale, so readers on the control thread never need the
/// load lock.
pub struct AlignmentDataManager {
    loader: Mutex<TileLoader>,
    intervals: Mutex<RangeCache<Arc<AlignmentInterval>>>,
    packed: Mutex<RangeCache<Arc<PackedAlignments>>>,
    pe_stats: Mutex<PeStatsMap>,
    flight: Arc<SingleFlight>,
    subscribers: Mutex<Vec<Sender<DataLoadedEvent>>>,
    cancel: CancelFlag,
    policy: Mutex<Box<dyn ReservoirPolicy>>,
    prefs: Preferences,
    /// Alias -> file sequence name (`1` <-> `chr1` style), built from the
    /// source's header so requests can use either naming convention.
    chr_aliases: FxHashMap<String, String>,
}

impl AlignmentDataManager {
    pub fn new(source: Box<dyn AlignmentSource>, prefs: Preferences) -> Self {
        let loader = TileLoader::new(source);
        let chr_aliases = chr_alias_map(loader.sequence_names().as_deref().unwrap_or_default());
        AlignmentDataManager {
            loader: Mutex::new(loader),
            intervals: Mutex::new(RangeCache::default()),
            packed: Mutex::new(RangeCache::default()),
            pe_stats: Mutex::new(PeStatsMap::default()),
            flight: Arc::new(SingleFlight::default()),
            subscribers: Mutex::new(Vec::new()),
            cancel: CancelFlag::default(),
            policy: Mutex::new(Box::new(UniformReservoir::new())),
            prefs,
            chr_aliases,
        }
    }

    /// Swap the downsampling replacement policy (the default is uniform
    /// reservoir sampling).
    pub fn set_downsample_policy(&self, policy: Box<dyn ReservoirPolicy>) {
        *self.policy.lock().unwrap() = policy;
    }

    /// Subscribe to completion notifications. Dropping the receiver
    /// unsubscribes; disconnected subscribers are pruned on publish.
    pub fn subscribe(&self) -> Receiver<DataLoadedEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn publish(&self, event: DataLoadedEvent) {
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Abort all in-flight source reads. The aborted load leaves prior
    /// cache state untouched; the flag clears when the next load starts.
    pub fn cancel_readers(&self) {
        self.cancel.cancel();
    }

    /// Request data for `viewport`. Fast path: the cached interval already
    /// contains the requested range. Otherwise a background load is
    /// dispatched, unless one is already in flight (in which case the
    /// request is dropped; re-issue after the completion event).
    ///
    /// `frames` is the set of viewports synchronized with this one (it
    /// should include `viewport` itself); the packer runs across all of
    /// them once the load completes.
    pub fn load(
        self: &Arc<Self>,
        viewport: &Viewport,
        frames: &[Viewport],
        options: &RenderOptions,
        expand: bool,
    ) {
        if self
            .intervals
            .lock()
            .unwrap()
            .contains(viewport.id, &viewport.range)
        {
            return;
        }

        let Some(guard) = self.flight.try_begin() else {
            log::debug!("load in flight, dropping request for {}", viewport.range);
            return;
        };
        self.cancel.reset();

        let fetch_range = if expand {
            // widen by at least half the max visible range on each side so
            // small pans stay cache hits
            let min_len = 2 * viewport
                .range
                .len()
                .max(self.prefs.max_visible_range() / 2);
            viewport.range.expanded_around_center(min_len)
        } else {
            viewport.range.clone()
        };

        log::debug!("loading alignments: {fetch_range}");

        let manager = self.clone();
        let viewport = viewport.clone();
        let frames: Vec<Viewport> = frames.to_vec();
        let options = options.clone();
        std::thread::spawn(move || {
            // the guard must die on every path or the manager deadlocks
            let _guard = guard;
            match manager.load_interval(&fetch_range) {
                Ok(interval) => {
                    manager.intervals.lock().unwrap().put(
                        viewport.id,
                        fetch_range.clone(),
                        Arc::new(interval),
                    );
                    manager.repack(&frames, &options);
                    manager.publish(DataLoadedEvent {
                        viewport: viewport.id,
                        range: fetch_range,
                    });
                }
                Err(err) if err.is::<LoadCancelled>() => {
                    log::debug!("load cancelled: {fetch_range}");
                }
                Err(err) => {
                    log::error!("failed to load alignments for {fetch_range}: {err:?}");
                }
            }
        });
    }

    /// Runs on the background load thread; the pe-stats map and loader are
    /// owned by the in-flight load for its duration.
    fn load_interval(&self, range: &GenomicRange) -> anyhow::Result<AlignmentInterval> {
        let query_range = self.resolve_range(range);
        let load_options = self.prefs.load_options();

        let mut loader = self.loader.lock().unwrap();
        let mut pe_stats = self.pe_stats.lock().unwrap();
        let mut policy = self.policy.lock().unwrap();

        let tile = loader.load_tile(
            &query_range,
            &load_options,
            &mut pe_stats,
            policy.as_mut(),
            &self.cancel,
        )?;

        // the interval keeps the caller's chromosome naming, whatever the
        // file's header calls it
        Ok(AlignmentInterval::new(
            range.clone(),
            tile.records,
            tile.coverage,
            tile.junctions,
            tile.downsampled,
        ))
    }

    /// Pack currently loaded intervals across `frames`. Returns false (and
    /// leaves any prior packing untouched) if any frame lacks a cached
    /// interval; this is the expected soft-fail while synchronized
    /// viewports are still loading.
    pub fn repack(&self, frames: &[Viewport], options: &RenderOptions) -> bool {
        let mut loaded: Vec<Arc<AlignmentInterval>> = Vec::with_capacity(frames.len());
        {
            let intervals = self.intervals.lock().unwrap();
            for frame in frames {
                match intervals.get(frame.id, &frame.range) {
                    Some(interval) => loaded.push(interval.clone()),
                    None => return false,
                }
            }
        }

        let refs: Vec<&AlignmentInterval> = loaded.iter().map(|iv| iv.as_ref()).collect();
        let packed = Arc::new(packer::pack(&refs, options));

        let mut cache = self.packed.lock().unwrap();
        for frame in frames {
            cache.put(frame.id, frame.range.clone(), packed.clone());
        }
        true
    }

    /// The packed alignments covering `viewport`, issuing a load and/or
    /// repack as needed. A cached packing built under different options is
    /// stale and gets rebuilt. May be absent while a load is still in
    /// flight.
    pub fn get_groups(
        self: &Arc<Self>,
        viewport: &Viewport,
        frames: &[Viewport],
        options: &RenderOptions,
    ) -> Option<Arc<PackedAlignments>> {
        self.load(viewport, frames, options, false);
        let stale = match self
            .packed
            .lock()
            .unwrap()
            .get(viewport.id, &viewport.range)
        {
            Some(packed) => packed.options() != options,
            None => true,
        };
        if stale {
            self.repack(frames, options);
        }
        self.packed
            .lock()
            .unwrap()
            .get(viewport.id, &viewport.range)
            .cloned()
    }

    /// Recompute row keys and stably reorder rows group by group. False if
    /// the viewport has no packed data (or no loaded interval) yet.
    pub fn sort_rows(
        &self,
        viewport: &Viewport,
        option: SortOption,
        pivot: u64,
        tag: Option<&str>,
        order: SortOrder,
    ) -> bool {
        if !self
            .intervals
            .lock()
            .unwrap()
            .contains(viewport.id, &viewport.range)
        {
            return false;
        }

        let mut cache = self.packed.lock().unwrap();
        let Some((stored_range, packed)) = cache.get_entry(viewport.id, &viewport.range) else {
            return false;
        };
        let stored_range = stored_range.clone();

        // packed values are shared between synchronized slots; sort a copy
        let mut sorted = (**packed).clone();
        sort::sort_rows(&mut sorted, option, pivot, tag, order);
        cache.put(viewport.id, stored_range, Arc::new(sorted));
        true
    }

    /// Toggle pair view and rebuild packing across the synchronized
    /// frames. No-op when the option is unchanged.
    pub fn set_view_as_pairs(
        &self,
        enabled: bool,
        frames: &[Viewport],
        options: &mut RenderOptions,
    ) {
        if options.view_as_pairs == enabled {
            return;
        }
        options.view_as_pairs = enabled;
        self.repack(frames, options);
    }

    /// Recompute insert-size percentile thresholds for every read group.
    pub fn update_pe_stats(&self) {
        let mut pe_stats = self.pe_stats.lock().unwrap();
        for stats in pe_stats.values_mut() {
            stats.compute(
                self.prefs.min_insert_size_percentile,
                self.prefs.max_insert_size_percentile,
            );
        }
    }

    /// Insert-size thresholds for a read group, once computed.
    pub fn pe_thresholds(&self, read_group: &str) -> Option<(u64, u64)> {
        let pe_stats = self.pe_stats.lock().unwrap();
        let stats = pe_stats.get(read_group)?;
        Some((stats.min_threshold()?, stats.max_threshold()?))
    }

    pub fn get_loaded_intervals(&self) -> Vec<Arc<AlignmentInterval>> {
        self.intervals.lock().unwrap().values().cloned().collect()
    }

    pub fn get_loaded_interval(&self, viewport: &Viewport) -> Option<Arc<AlignmentInterval>> {
        self.intervals
            .lock()
            .unwrap()
            .get(viewport.id, &viewport.range)
            .cloned()
    }

    /// Max lane count over all packed entries (display height).
    pub fn n_levels(&self) -> usize {
        self.packed
            .lock()
            .unwrap()
            .values()
            .map(|p| p.n_levels())
            .max()
            .unwrap_or(0)
    }

    /// Max group count over all packed entries; more than one entry exists
    /// when viewing split screen.
    pub fn max_group_count(&self) -> usize {
        self.packed
            .lock()
            .unwrap()
            .values()
            .map(|p| p.group_count())
            .max()
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.intervals.lock().unwrap().clear();
        self.packed.lock().unwrap().clear();
    }

    /// Drop the cached data for a viewport that is no longer displayed;
    /// other viewports keep their slots.
    pub fn close_viewport(&self, viewport: ViewportId) {
        self.intervals.lock().unwrap().remove(viewport);
        self.packed.lock().unwrap().remove(viewport);
    }

    pub fn has_index(&self) -> bool {
        self.loader.lock().unwrap().has_index()
    }

    pub fn sequence_names(&self) -> Option<Vec<String>> {
        self.loader.lock().unwrap().sequence_names()
    }

    pub fn platforms(&self) -> Option<HashSet<String>> {
        self.loader.lock().unwrap().platforms()
    }

    pub fn is_paired_end(&self) -> bool {
        self.loader.lock().unwrap().is_paired_end()
    }

    pub fn is_ion_torrent(&self) -> bool {
        self.platforms()
            .is_some_and(|p| p.contains("IONTORRENT"))
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    fn resolve_range(&self, range: &GenomicRange) -> GenomicRange {
        match self.chr_aliases.get(&*range.chrom) {
            Some(name) => GenomicRange::new(name.as_str(), range.start, range.end),
            None => range.clone(),
        }
    }
}

/// `1 -> chr1` / `chr1 -> 1` aliases for every sequence in the file, so
/// both naming conventions resolve to the file's own names.
fn chr_alias_map(sequence_names: &[String]) -> FxHashMap<String, String> {
    let mut aliases = FxHashMap::default();
    for name in sequence_names {
        let alias = match name.strip_prefix("chr") {
            Some(rest) => rest.to_string(),
            None => format!("chr{name}"),
        };
        aliases.insert(alias, name.clone());
    }
    aliases
}
