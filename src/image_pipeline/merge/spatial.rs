use rayon::prelude::*;
use tracing::{debug, info_span};

use super::burst::PreparedBurst;
use crate::image_pipeline::align::{AlignmentSchedule, Pyramid, TileAligner};
use crate::image_pipeline::common::ComputeContext;
use crate::image_pipeline::texture::Mosaic;

/// Binomial blur half-width used before comparing frames.
const BLUR_KERNEL_SIZE: usize = 16;

/// Maps the noise-reduction setting to a tolerance multiplier on the noise level.
///
/// Returns `f32::INFINITY` when the setting is so strong that every aligned
/// sample is accepted.
pub fn robustness_from_noise_reduction(noise_reduction: f64) -> f32 {
    let robustness_rev = 0.5 * (36.0 - (noise_reduction + 0.5).floor());
    let denominator = 0.12 * 1.3f64.powf(robustness_rev) - 0.4529822;
    if denominator <= 0.0 {
        f32::INFINITY
    } else {
        (1.0 / denominator) as f32
    }
}

/// Weight of an aligned sample: 1 for no difference, falling linearly to 0
/// at `noise_sd * robustness`.
pub fn compute_merge_weight(diff: f32, noise_sd: f32, robustness: f32) -> f32 {
    if robustness.is_infinite() {
        return 1.0;
    }
    let max_diff = noise_sd * robustness;
    if max_diff <= f32::EPSILON {
        return if diff <= f32::EPSILON { 1.0 } else { 0.0 };
    }
    (1.0 - diff / max_diff).clamp(0.0, 1.0)
}

/// Robust per-pixel average of aligned frames, for any mosaic pattern.
pub struct SpatialMerger<'a> {
    ctx: &'a ComputeContext,
    schedule: &'a AlignmentSchedule,
    robustness: f32,
}

impl<'a> SpatialMerger<'a> {
    pub fn new(ctx: &'a ComputeContext, schedule: &'a AlignmentSchedule, noise_reduction: f64) -> Self {
        Self {
            ctx,
            schedule,
            robustness: robustness_from_noise_reduction(noise_reduction),
        }
    }

    pub fn merge(&self, burst: &PreparedBurst) -> Mosaic {
        let reference = burst.reference();
        let (width, height) = reference.dimensions();
        let mosaic_pattern_width = burst.mosaic_pattern_width();

        let padding = self.schedule.padding(width, height, 0);
        let ref_pyramid = Pyramid::build(
            self.ctx,
            &reference.pixels.pad(padding),
            self.schedule,
            reference.pyramid_params(),
        );

        let ref_blurred = reference.pixels.blur_mosaic(self.ctx, mosaic_pattern_width, BLUR_KERNEL_SIZE);
        let noise_sd = reference
            .pixels
            .color_difference(&ref_blurred, mosaic_pattern_width)
            .mean();
        debug!(noise_sd, robustness = self.robustness, "Spatial merge noise estimate");

        let aligner = TileAligner::new(self.ctx, self.schedule);
        let exposure = burst.exposure_mode();
        let aligned: Vec<(usize, Mosaic)> = burst
            .comparison_indices()
            .par_iter()
            .map(|&index| {
                let frame = &burst.frames()[index];
                let _span = info_span!("align_frame", frame = index).entered();
                let warped = aligner.align(&ref_pyramid, &frame.pixels.pad(padding), frame.pyramid_params(), exposure);
                (index, warped.crop(padding))
            })
            .collect();

        let mut merged = reference.pixels.clone();
        for (index, comparison) in &aligned {
            let comp_blurred = comparison.blur_mosaic(self.ctx, mosaic_pattern_width, BLUR_KERNEL_SIZE);
            let weights = ref_blurred
                .color_difference(&comp_blurred, mosaic_pattern_width)
                .map(|&diff| compute_merge_weight(diff, noise_sd, self.robustness))
                .upsample_bilinear(width, height);
            debug!(frame = *index, mean_weight = weights.mean(), "Frame merged");

            merged
                .pixels_mut()
                .par_iter_mut()
                .zip(comparison.pixels().par_iter())
                .zip(reference.pixels.pixels().par_iter())
                .zip(weights.pixels().par_iter())
                .for_each(|(((out, &c), &r), &w)| *out += w * c + (1.0 - w) * r);
        }

        merged.scale(1.0 / burst.len() as f32);
        merged
    }
}
