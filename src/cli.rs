use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct Cli {
    /// Path to input BAM or SAM
    pub alignments: PathBuf,

    /// Region to load, as `chrom:start-end`
    #[arg(short, long)]
    pub region: String,

    /// Group rows by strand, sample, read group, or mate chromosome
    #[arg(long = "group-by")]
    pub group_by: Option<String>,

    /// Group rows by the value of this tag
    #[arg(long = "group-by-tag", conflicts_with = "group_by")]
    pub group_by_tag: Option<String>,

    /// Coalesce proper pairs into single occupants
    #[arg(long)]
    pub pairs: bool,

    /// Disable downsampling and load every record
    #[arg(long)]
    pub no_downsample: bool,

    /// Override the downsampling window size in bp
    #[arg(long)]
    pub sampling_window: Option<u64>,

    /// Override the max retained reads per sampling window
    #[arg(long)]
    pub sampling_count: Option<usize>,
}
