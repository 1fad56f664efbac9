use super::schedule::AlignmentSchedule;
use crate::image_pipeline::common::ComputeContext;
use crate::image_pipeline::texture::Mosaic;

/// Binomial kernel radius applied before each 2x reduction.
const LEVEL_BLUR_KERNEL: usize = 2;

/// Frame properties that shape its pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PyramidParams {
    pub black_level_mean: f32,
    pub color_factors: Option<[f32; 3]>,
    pub mosaic_pattern_width: usize,
}

/// Grayscale pyramid of one frame, finest level first.
#[derive(Debug, Clone)]
pub struct Pyramid {
    levels: Vec<Mosaic>,
}

impl Pyramid {
    pub fn build(ctx: &ComputeContext, frame: &Mosaic, schedule: &AlignmentSchedule, params: PyramidParams) -> Self {
        let color_factors = params
            .color_factors
            .filter(|f| params.mosaic_pattern_width == 2 && f.iter().all(|&c| c > 0.0));

        let base = frame.avg_pool(
            schedule.downscale_factor(0),
            params.black_level_mean.max(0.0),
            color_factors,
        );

        let levels = (1..schedule.levels()).fold(vec![base], |mut levels, level| {
            let next = levels[level - 1]
                .blur_mosaic(ctx, 1, LEVEL_BLUR_KERNEL)
                .avg_pool(schedule.downscale_factor(level), 0.0, None);
            levels.push(next);
            levels
        });

        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level(&self, index: usize) -> &Mosaic {
        &self.levels[index]
    }

    pub fn levels(&self) -> &[Mosaic] {
        &self.levels
    }
}
