use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;

use samview::config::{self, GroupOption, RenderOptions};
use samview::manager::AlignmentDataManager;
use samview::range::GenomicRange;
use samview::source;
use samview::view::Viewport;

mod cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = cli::Cli::parse();

    let mut prefs = config::load_app_config().unwrap_or_default();
    if args.no_downsample {
        prefs.downsample_reads = false;
    }
    if let Some(window) = args.sampling_window {
        prefs.sampling_window = window;
    }
    if let Some(count) = args.sampling_count {
        prefs.sampling_count = count;
    }

    let group_by = match (args.group_by.as_deref(), args.group_by_tag) {
        (None, None) => GroupOption::None,
        (None, Some(tag)) => GroupOption::Tag(tag),
        (Some("strand"), _) => GroupOption::Strand,
        (Some("sample"), _) => GroupOption::Sample,
        (Some("read-group"), _) => GroupOption::ReadGroup,
        (Some("mate-chromosome"), _) => GroupOption::MateChromosome,
        (Some(other), _) => return Err(anyhow!("unknown group-by option `{other}`")),
    };
    let options = RenderOptions {
        view_as_pairs: args.pairs,
        group_by,
        ..RenderOptions::default()
    };

    let range: GenomicRange = args.region.parse()?;

    let source = source::open_source(&args.alignments)?;
    let manager = Arc::new(AlignmentDataManager::new(source, prefs));
    let events = manager.subscribe();

    let viewport = Viewport::new(range.clone());
    let frames = [viewport.clone()];

    manager.load(&viewport, &frames, &options, true);
    events
        .recv_timeout(Duration::from_secs(120))
        .map_err(|_| anyhow!("timed out loading {range}"))?;

    let interval = manager
        .get_loaded_interval(&viewport)
        .ok_or_else(|| anyhow!("no data loaded for {range}"))?;
    let packed = manager
        .get_groups(&viewport, &frames, &options)
        .ok_or_else(|| anyhow!("no packed data for {range}"))?;

    println!("loaded {}", interval.range());
    println!("  records:     {}", interval.records().len());
    println!("  max depth:   {}", interval.coverage().max_depth());
    println!("  junctions:   {}", interval.junctions().len());
    if !interval.downsampled_intervals().is_empty() {
        let omitted: u32 = interval
            .downsampled_intervals()
            .iter()
            .map(|d| d.count)
            .sum();
        println!(
            "  downsampled: {} windows, {omitted} reads omitted",
            interval.downsampled_intervals().len()
        );
    }
    println!("packed into {} rows", packed.n_levels());
    for (group, rows) in packed.groups() {
        if group.is_empty() {
            continue;
        }
        println!("  group `{group}`: {} rows", rows.len());
    }
    if packed.dropped_count() > 0 {
        println!("  {} reads dropped at the row cap", packed.dropped_count());
    }

    Ok(())
}
