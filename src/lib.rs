pub mod alignment;
pub mod range;
pub mod view;

pub mod config;

pub mod cache;
pub mod coverage;
pub mod interval;
pub mod loader;
pub mod manager;
pub mod packer;
pub mod pestats;
pub mod sample;
pub mod sort;
pub mod source;
pub mod splice;

pub use alignment::{AlignmentRecord, PackedFeature, Strand};
pub use range::GenomicRange;
pub use view::{Viewport, ViewportId};

pub use config::{GroupOption, Preferences, RenderOptions};
pub use interval::AlignmentInterval;
pub use manager::{AlignmentDataManager, DataLoadedEvent};
pub use packer::PackedAlignments;
