use tracing::debug;

use super::burst::PreparedBurst;
use crate::image_pipeline::texture::Mosaic;

/// Weighted mean of all frames without alignment.
///
/// Uniform bursts get equal weights. In bracketed bursts each frame counts in
/// proportion to its exposure, since longer exposures carry less shot noise.
pub fn average_frames(burst: &PreparedBurst) -> Mosaic {
    let uniform = burst.uniform_exposure();
    let weights: Vec<f32> = (0..burst.len())
        .map(|index| if uniform { 1.0 } else { burst.exposure_factor(index) })
        .collect();
    let total: f32 = weights.iter().sum();
    debug!(?weights, "Averaging frames without alignment");

    let (width, height) = burst.reference().dimensions();
    let mut merged = Mosaic::new_default(width, height);
    for (frame, weight) in burst.frames().iter().zip(&weights) {
        merged.add_scaled(&frame.pixels, weight / total);
    }
    merged
}
