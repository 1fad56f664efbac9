use crate::image_pipeline::align::{ExposureMode, PyramidParams};
use crate::image_pipeline::radiometry::exposure_factor;
use crate::image_pipeline::raw::types::{FrameMetadata, RawImageData};
use crate::image_pipeline::texture::Mosaic;

/// One frame of a burst in float form.
#[derive(Debug, Clone)]
pub struct BurstFrame {
    pub pixels: Mosaic,
    pub metadata: FrameMetadata,
}

impl BurstFrame {
    pub fn new(pixels: Mosaic, metadata: FrameMetadata) -> Self {
        Self { pixels, metadata }
    }

    pub fn from_raw(raw: &RawImageData) -> Self {
        Self::new(
            Mosaic::from_u16(raw.width, raw.height, &raw.data),
            raw.metadata.clone(),
        )
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.pixels.dimensions()
    }

    pub fn pyramid_params(&self) -> PyramidParams {
        PyramidParams {
            black_level_mean: self.metadata.black_level_mean().unwrap_or(0.0),
            color_factors: self.metadata.color_factors_f32(),
            mosaic_pattern_width: self.metadata.mosaic_pattern_width,
        }
    }
}

/// Validated burst after hot-pixel repair and exposure equalization.
#[derive(Debug, Clone)]
pub struct PreparedBurst {
    frames: Vec<BurstFrame>,
    reference_index: usize,
}

impl PreparedBurst {
    pub fn new(frames: Vec<BurstFrame>, reference_index: usize) -> Self {
        assert!(reference_index < frames.len(), "reference index out of range");
        Self {
            frames,
            reference_index,
        }
    }

    pub fn frames(&self) -> &[BurstFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn reference_index(&self) -> usize {
        self.reference_index
    }

    pub fn reference(&self) -> &BurstFrame {
        &self.frames[self.reference_index]
    }

    /// Indices of every frame except the reference, in burst order.
    pub fn comparison_indices(&self) -> Vec<usize> {
        (0..self.frames.len())
            .filter(|&i| i != self.reference_index)
            .collect()
    }

    pub fn mosaic_pattern_width(&self) -> usize {
        self.reference().metadata.mosaic_pattern_width
    }

    pub fn uniform_exposure(&self) -> bool {
        let bias = self.reference().metadata.exposure_bias;
        self.frames.iter().all(|f| f.metadata.exposure_bias == bias)
    }

    pub fn exposure_mode(&self) -> ExposureMode {
        if self.uniform_exposure() {
            ExposureMode::Uniform
        } else {
            ExposureMode::Bracketed
        }
    }

    /// Exposure of frame `index` relative to the reference, as a linear factor.
    pub fn exposure_factor(&self, index: usize) -> f32 {
        exposure_factor(
            self.frames[index].metadata.exposure_bias,
            self.reference().metadata.exposure_bias,
        )
    }
}
