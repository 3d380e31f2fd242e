use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use std::io::prelude::*;

use crate::sample::DownsampleOptions;
use crate::splice::SpliceLoadOptions;

pub const CONFIG_FILE_NAME: &'static str = "config.ron";

/// Persisted preferences; read once at load time, a snapshot travels with
/// each loaded interval.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Preferences {
    pub downsample_reads: bool,
    /// Sampling window in bp.
    pub sampling_window: u64,
    /// Max retained reads per sampling window.
    pub sampling_count: usize,
    /// Max visible range in kb; also bounds fetch-window expansion.
    pub max_visible_range_kb: u64,
    pub min_insert_size_percentile: f64,
    pub max_insert_size_percentile: f64,
    pub min_junction_coverage: u32,
    pub min_read_flanking_width: u64,
    /// Stratify per-base coverage counts by strand.
    pub coverage_by_strand: bool,
    pub filter_duplicates: bool,
    pub filter_vendor_failed: bool,
}

impl std::default::Default for Preferences {
    fn default() -> Self {
        Self {
            downsample_reads: true,
            sampling_window: 50,
            sampling_count: 100,
            max_visible_range_kb: 30,
            min_insert_size_percentile: 0.5,
            max_insert_size_percentile: 99.5,
            min_junction_coverage: 1,
            min_read_flanking_width: 0,
            coverage_by_strand: false,
            filter_duplicates: true,
            filter_vendor_failed: true,
        }
    }
}

impl Preferences {
    pub fn downsample_options(&self) -> DownsampleOptions {
        DownsampleOptions {
            enabled: self.downsample_reads,
            sample_window_size: self.sampling_window,
            max_read_count: self.sampling_count,
        }
    }

    pub fn splice_options(&self) -> SpliceLoadOptions {
        SpliceLoadOptions {
            min_junction_coverage: self.min_junction_coverage,
            min_read_flanking_width: self.min_read_flanking_width,
        }
    }

    pub fn max_visible_range(&self) -> u64 {
        self.max_visible_range_kb * 1000
    }

    pub fn load_options(&self) -> crate::loader::LoadOptions {
        crate::loader::LoadOptions {
            downsample: self.downsample_options(),
            splice: self.splice_options(),
            coverage_by_strand: self.coverage_by_strand,
            filter_duplicates: self.filter_duplicates,
            filter_vendor_failed: self.filter_vendor_failed,
        }
    }
}

/// How lane occupants are partitioned into display groups.
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum GroupOption {
    #[default]
    None,
    Strand,
    Sample,
    ReadGroup,
    Tag(String),
    MateChromosome,
}

/// Options the packer and sort engine read; a snapshot travels with each
/// packing so a change in any of these forces a repack rather than an
/// incremental update.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RenderOptions {
    pub view_as_pairs: bool,
    pub group_by: GroupOption,
    /// Display-density cap on rows per group; occupants that don't fit once
    /// it is reached are dropped from packing.
    pub max_rows: usize,
}

impl std::default::Default for RenderOptions {
    fn default() -> Self {
        Self {
            view_as_pairs: false,
            group_by: GroupOption::None,
            max_rows: 1_000_000,
        }
    }
}

pub fn app_dir() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "", "SamView")
}

pub fn load_app_config() -> anyhow::Result<Preferences> {
    let app_dirs = app_dir().ok_or(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "Could not find application config directory",
    ))?;

    let mut cfg_path = app_dirs.config_dir().to_path_buf();
    cfg_path.push(CONFIG_FILE_NAME);

    let mut file = std::fs::File::open(&cfg_path)?;
    let mut cfg_buf = String::new();
    let len = file.read_to_string(&mut cfg_buf)?;

    let cfg = ron::de::from_str(&cfg_buf[..len])?;

    Ok(cfg)
}

pub fn save_app_config(config: &Preferences) -> anyhow::Result<()> {
    let app_dirs = app_dir().ok_or(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "Could not find application config directory",
    ))?;

    let mut cfg_path = app_dirs.config_dir().to_path_buf();

    if !cfg_path.exists() {
        std::fs::create_dir(&cfg_path)?;
    }

    if !cfg_path.is_dir() {
        anyhow::bail!(
            "A file exists at the config directory path `{cfg_path:?}` but it is not a directory"
        );
    }

    cfg_path.push(CONFIG_FILE_NAME);

    let mut file = std::fs::File::create(&cfg_path)?;

    ron::ser::to_writer_pretty(&mut file, config, ron::ser::PrettyConfig::new())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferences_ron_roundtrip() {
        let prefs = Preferences {
            sampling_window: 25,
            max_visible_range_kb: 100,
            ..Preferences::default()
        };
        let text = ron::ser::to_string(&prefs).unwrap();
        let back: Preferences = ron::de::from_str(&text).unwrap();
        assert_eq!(prefs, back);
        assert_eq!(back.max_visible_range(), 100_000);
    }
}
