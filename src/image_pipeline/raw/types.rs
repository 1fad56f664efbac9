//! RAW image data types

/// Per-frame capture metadata.
///
/// Levels the decoder could not determine are `None`; stages that need them
/// skip their work instead of guessing.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    /// Period of the colour filter array: 2 for Bayer, 6 for X-Trans.
    pub mosaic_pattern_width: usize,
    /// Black level per 2x2 mosaic position, row-major.
    pub black_levels: Option<[i32; 4]>,
    pub white_level: Option<i32>,
    /// Exposure bias in hundredths of an EV.
    pub exposure_bias: i32,
    /// ISO multiplied by exposure time in seconds.
    pub iso_exposure_time: f64,
    /// White-balance multipliers (R, G, B).
    pub color_factors: Option<[f64; 3]>,
}

impl Default for FrameMetadata {
    fn default() -> Self {
        Self {
            mosaic_pattern_width: 2,
            black_levels: None,
            white_level: None,
            exposure_bias: 0,
            iso_exposure_time: 0.0,
            color_factors: None,
        }
    }
}

impl FrameMetadata {
    pub fn is_bayer(&self) -> bool {
        self.mosaic_pattern_width == 2
    }

    pub fn black_levels_f32(&self) -> Option<[f32; 4]> {
        self.black_levels.map(|levels| levels.map(|b| b as f32))
    }

    pub fn black_level_mean(&self) -> Option<f32> {
        self.black_levels_f32().map(|levels| levels.iter().sum::<f32>() / 4.0)
    }

    /// Black level of the sample at `(x, y)`. Non-Bayer sensors use the mean.
    pub fn black_level_at(&self, x: usize, y: usize) -> Option<f32> {
        let levels = self.black_levels_f32()?;
        if self.is_bayer() {
            Some(levels[(y % 2) * 2 + x % 2])
        } else {
            self.black_level_mean()
        }
    }

    pub fn color_factors_f32(&self) -> Option<[f32; 3]> {
        self.color_factors.map(|f| f.map(|c| c as f32))
    }
}

/// Represents decoded RAW image data
#[derive(Debug, Clone, PartialEq)]
pub struct RawImageData {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
    /// Raw pixel data (single channel mosaic)
    pub data: Vec<u16>,
    /// Actual bits per sample from the sensor (e.g., 12, 14, or 16)
    pub bits_per_sample: u32,
    pub metadata: FrameMetadata,
}
