use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::common::ComputeContext;
use crate::image_pipeline::merge::ExposureControl;
use crate::image_pipeline::raw::types::FrameMetadata;
use crate::image_pipeline::texture::{ImageBuffer, Mosaic};

/// Binomial radius of the blur applied before measuring the merged maximum.
const MAX_VALUE_BLUR_KERNEL: usize = 2;

/// Linear brightness of `exposure_bias` relative to `reference_bias` (hundredths of EV).
pub fn exposure_factor(exposure_bias: i32, reference_bias: i32) -> f32 {
    2f32.powf((exposure_bias - reference_bias) as f32 / 100.0)
}

/// Scales a frame's signal above black to the reference exposure.
///
/// Frames already at the reference bias, or without black levels, pass through.
pub fn equalize_exposure(pixels: Mosaic, metadata: &FrameMetadata, reference_bias: i32) -> Mosaic {
    if metadata.exposure_bias == reference_bias {
        return pixels;
    }
    if metadata.black_levels.is_none() {
        debug!(bias = metadata.exposure_bias, "Black levels unknown, exposure not equalized");
        return pixels;
    }

    let gain = exposure_factor(reference_bias, metadata.exposure_bias);
    ImageBuffer::from_fn(pixels.width(), pixels.height(), |x, y| {
        let black = metadata.black_level_at(x, y).unwrap_or_default();
        (pixels[(x, y)] - black) * gain + black
    })
}

/// Applies the configured exposure control to the merged frame.
///
/// The gain is derived from the maximum of a lightly blurred copy so single
/// noisy samples do not set it. Skipped when black or white levels are unknown.
pub fn correct_exposure(
    ctx: &ComputeContext,
    merged: Mosaic,
    control: ExposureControl,
    metadata: &FrameMetadata,
) -> Mosaic {
    if control == ExposureControl::Off {
        return merged;
    }
    let (Some(white), Some(black)) = (metadata.white_level, metadata.black_level_mean()) else {
        debug!(%control, "Black or white level unknown, exposure correction skipped");
        return merged;
    };

    let max_value = merged
        .blur_mosaic(ctx, metadata.mosaic_pattern_width, MAX_VALUE_BLUR_KERNEL)
        .max_value();
    let headroom = max_value - black;
    if headroom <= f32::EPSILON {
        return merged;
    }
    let full_range_gain = (white as f32 - black) / headroom;
    let bias_ev = metadata.exposure_bias as f32 / 100.0;

    debug!(%control, max_value, full_range_gain, "Correcting exposure");

    match control {
        ExposureControl::Off => merged,
        ExposureControl::LinearFullRange => apply_linear_gain(merged, black, full_range_gain),
        ExposureControl::Linear1Ev => apply_linear_gain(merged, black, full_range_gain.min(2.0)),
        ExposureControl::Curve0Ev => apply_tone_curve(merged, black, headroom, 2f32.powf(-bias_ev)),
        ExposureControl::Curve1Ev => apply_tone_curve(merged, black, headroom, 2f32.powf(1.0 - bias_ev)),
    }
}

fn apply_linear_gain(mut pixels: Mosaic, black: f32, gain: f32) -> Mosaic {
    pixels
        .pixels_mut()
        .par_iter_mut()
        .for_each(|v| *v = (*v - black) * gain + black);
    pixels
}

/// Lifts shadows by `gain` while keeping `black + headroom` fixed.
fn apply_tone_curve(mut pixels: Mosaic, black: f32, headroom: f32, gain: f32) -> Mosaic {
    if gain <= 1.0 {
        return pixels;
    }
    pixels.pixels_mut().par_iter_mut().for_each(|v| {
        let x = (*v - black) / headroom;
        let y = if x > 0.0 {
            gain * x / (1.0 + (gain - 1.0) * x)
        } else {
            gain * x
        };
        *v = black + y * headroom;
    });
    pixels
}
