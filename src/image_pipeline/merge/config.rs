//! Merge configuration types

use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString};

use crate::image_pipeline::common::error::{MergeError, Result};

/// Noise reduction value that switches to plain temporal averaging.
pub const MAX_NOISE_REDUCTION: f64 = 23.0;
pub const MIN_NOISE_REDUCTION: f64 = 1.0;

/// Finest-level alignment tile edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum TileSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl TileSize {
    pub fn pixels(self) -> usize {
        match self {
            TileSize::Small => 16,
            TileSize::Medium => 32,
            TileSize::Large => 64,
        }
    }
}

/// How far the alignment search may reach; larger reach means a coarser top level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum SearchDistance {
    Small,
    #[default]
    Medium,
    Large,
}

impl SearchDistance {
    /// Pyramid levels are added until the short side is at most this many pixels.
    pub fn resolution_threshold(self) -> usize {
        match self {
            SearchDistance::Small => 128,
            SearchDistance::Medium => 64,
            SearchDistance::Large => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum MergingAlgorithm {
    /// Spatial-domain robust average.
    Fast,
    /// Frequency-domain Wiener merge (Bayer sensors only).
    #[default]
    HigherQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ExposureControl {
    Off,
    /// Linear gain that puts the brightest (blurred) sample at the white level.
    #[default]
    LinearFullRange,
    /// Like `LinearFullRange` but capped at +1 EV.
    #[strum(to_string = "Linear1EV")]
    Linear1Ev,
    /// Tone curve lifting the reference to 0 EV bias.
    #[strum(to_string = "Curve0EV")]
    Curve0Ev,
    /// Tone curve lifting the reference to +1 EV bias.
    #[strum(to_string = "Curve1EV")]
    Curve1Ev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum OutputBitDepth {
    #[default]
    Native,
    #[strum(to_string = "16bit", serialize = "16-bit")]
    SixteenBit,
}

/// Parses a textual option, reporting which option was malformed.
pub fn parse_option<T: FromStr>(name: &'static str, value: &str) -> Result<T> {
    value.parse().map_err(|_| MergeError::InvalidOption {
        name,
        value: value.to_string(),
    })
}

/// Settings for one merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConfig {
    pub algorithm: MergingAlgorithm,
    pub tile_size: TileSize,
    pub search_distance: SearchDistance,
    /// 1.0 (least) to 23.0; 23.0 averages frames without alignment.
    pub noise_reduction: f64,
    pub exposure_control: ExposureControl,
    pub output_bit_depth: OutputBitDepth,
    pub reference_index: usize,
    /// Worker threads for merging; `None` uses every core.
    pub threads: Option<usize>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            algorithm: MergingAlgorithm::default(),
            tile_size: TileSize::default(),
            search_distance: SearchDistance::default(),
            noise_reduction: 13.0,
            exposure_control: ExposureControl::default(),
            output_bit_depth: OutputBitDepth::default(),
            reference_index: 0,
            threads: None,
        }
    }
}

impl MergeConfig {
    pub fn builder() -> MergeConfigBuilder {
        MergeConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_NOISE_REDUCTION..=MAX_NOISE_REDUCTION).contains(&self.noise_reduction) {
            return Err(MergeError::InvalidNoiseReduction(self.noise_reduction));
        }
        Ok(())
    }

    /// Maximum noise reduction skips alignment and averages the frames.
    pub fn bypasses_alignment(&self) -> bool {
        self.noise_reduction >= MAX_NOISE_REDUCTION
    }
}

/// Builder for MergeConfig
#[derive(Default)]
pub struct MergeConfigBuilder {
    algorithm: Option<MergingAlgorithm>,
    tile_size: Option<TileSize>,
    search_distance: Option<SearchDistance>,
    noise_reduction: Option<f64>,
    exposure_control: Option<ExposureControl>,
    output_bit_depth: Option<OutputBitDepth>,
    reference_index: Option<usize>,
    threads: Option<Option<usize>>,
}

impl MergeConfigBuilder {
    pub fn algorithm(mut self, algorithm: MergingAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn tile_size(mut self, tile_size: TileSize) -> Self {
        self.tile_size = Some(tile_size);
        self
    }

    pub fn search_distance(mut self, search_distance: SearchDistance) -> Self {
        self.search_distance = Some(search_distance);
        self
    }

    pub fn noise_reduction(mut self, noise_reduction: f64) -> Self {
        self.noise_reduction = Some(noise_reduction);
        self
    }

    pub fn exposure_control(mut self, exposure_control: ExposureControl) -> Self {
        self.exposure_control = Some(exposure_control);
        self
    }

    pub fn output_bit_depth(mut self, output_bit_depth: OutputBitDepth) -> Self {
        self.output_bit_depth = Some(output_bit_depth);
        self
    }

    pub fn reference_index(mut self, reference_index: usize) -> Self {
        self.reference_index = Some(reference_index);
        self
    }

    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn build(self) -> MergeConfig {
        let default = MergeConfig::default();
        MergeConfig {
            algorithm: self.algorithm.unwrap_or(default.algorithm),
            tile_size: self.tile_size.unwrap_or(default.tile_size),
            search_distance: self.search_distance.unwrap_or(default.search_distance),
            noise_reduction: self.noise_reduction.unwrap_or(default.noise_reduction),
            exposure_control: self.exposure_control.unwrap_or(default.exposure_control),
            output_bit_depth: self.output_bit_depth.unwrap_or(default.output_bit_depth),
            reference_index: self.reference_index.unwrap_or(default.reference_index),
            threads: self.threads.unwrap_or(default.threads),
        }
    }
}
