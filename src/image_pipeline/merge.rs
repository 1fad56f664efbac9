//! Burst align-and-merge engine
//!
//! Validates and prepares a burst, then merges it in the frequency domain,
//! in the spatial domain, or by plain averaging at maximum noise reduction.

mod burst;
mod config;
mod engine;
mod fourier;
mod frequency;
mod spatial;
mod temporal;

pub use burst::{BurstFrame, PreparedBurst};
pub use config::{
    ExposureControl, MergeConfig, MergeConfigBuilder, MergingAlgorithm, OutputBitDepth,
    SearchDistance, TileSize, parse_option,
};
pub use engine::{BurstMerger, MergedFrame, MergedImage};
pub use fourier::TileTransform;
pub use frequency::{FrequencyMerger, MERGE_TILE_SIZE, NoiseModel};
pub use spatial::{SpatialMerger, compute_merge_weight, robustness_from_noise_reduction};
pub use temporal::average_frames;
