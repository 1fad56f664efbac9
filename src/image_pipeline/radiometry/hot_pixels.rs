use rayon::prelude::*;
use tracing::debug;

use crate::image_pipeline::raw::types::FrameMetadata;
use crate::image_pipeline::texture::{ImageBuffer, Mosaic};

/// Base ratio of excess brightness over local brightness that marks a hot pixel.
const BASE_THRESHOLD: f32 = 0.5;
/// Hot pixels must also stand out by this many DN, so dark noise is never flagged.
const MIN_DEVIATION: f32 = 32.0;

/// Correction strength for a mean ISO x exposure time: stronger for long, high-ISO captures.
pub fn correction_strength(iso_exposure_time: f64) -> f32 {
    let ratio = iso_exposure_time.max(1.0) / 100.0;
    (1.0 + 0.1 * ratio.log2()).clamp(1.0, 2.0) as f32
}

/// Relative threshold; bursts with few frames need a larger margin.
pub fn detection_threshold(strength: f32, frame_count: usize) -> f32 {
    BASE_THRESHOLD * (1.0 + 2.0 / (frame_count.max(1) as f32).sqrt()) / strength
}

/// Positions of pixels that stay bright across the whole burst.
///
/// Detection works on the black-subtracted average of all frames: a pixel is
/// hot when it exceeds the mean of its eight same-colour neighbours by more
/// than the threshold times (local mean + channel mean). Pixels within one
/// mosaic period of the border are never flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotPixelMap {
    width: usize,
    height: usize,
    indices: Vec<usize>,
}

impl HotPixelMap {
    /// Returns `None` when any frame lacks black levels.
    pub fn detect(frames: &[(&Mosaic, &FrameMetadata)], mosaic_pattern_width: usize) -> Option<Self> {
        let (first, _) = frames.first()?;
        if frames.iter().any(|(_, meta)| meta.black_levels.is_none()) {
            debug!("Black levels unknown, skipping hot pixel correction");
            return None;
        }

        let (width, height) = first.dimensions();
        let period = mosaic_pattern_width.max(1);
        if width <= 2 * period || height <= 2 * period {
            return Some(Self {
                width,
                height,
                indices: Vec::new(),
            });
        }

        let inv_count = 1.0 / frames.len() as f32;
        let average = ImageBuffer::from_fn(width, height, |x, y| {
            frames
                .iter()
                .map(|(frame, meta)| frame[(x, y)] - meta.black_level_at(x, y).unwrap_or_default())
                .sum::<f32>()
                * inv_count
        });

        let classes = period * period;
        let mut sums = vec![0.0f64; classes];
        let mut counts = vec![0usize; classes];
        for (i, &v) in average.pixels().iter().enumerate() {
            let class = ((i / width) % period) * period + (i % width) % period;
            sums[class] += f64::from(v);
            counts[class] += 1;
        }
        let channel_means: Vec<f32> = sums
            .iter()
            .zip(&counts)
            .map(|(&s, &n)| if n > 0 { (s / n as f64) as f32 } else { 0.0 })
            .collect();

        let mean_iso_exposure =
            frames.iter().map(|(_, m)| m.iso_exposure_time).sum::<f64>() / frames.len() as f64;
        let strength = correction_strength(mean_iso_exposure);
        let threshold = detection_threshold(strength, frames.len());

        let average = &average;
        let channel_means = &channel_means;
        let p = period;
        let indices: Vec<usize> = (p..height - p)
            .into_par_iter()
            .flat_map_iter(|y| {
                (p..width - p).filter_map(move |x| {
                    let value = average[(x, y)];
                    let local = (average[(x - p, y - p)]
                        + average[(x, y - p)]
                        + average[(x + p, y - p)]
                        + average[(x - p, y)]
                        + average[(x + p, y)]
                        + average[(x - p, y + p)]
                        + average[(x, y + p)]
                        + average[(x + p, y + p)])
                        / 8.0;
                    let channel_mean = channel_means[(y % p) * p + x % p];
                    let deviation = value - local;
                    let limit = threshold * (local.max(0.0) + channel_mean.max(0.0));
                    (deviation > MIN_DEVIATION && deviation > limit).then_some(y * width + x)
                })
            })
            .collect();

        debug!(count = indices.len(), threshold, strength, "Hot pixel detection complete");

        Some(Self {
            width,
            height,
            indices,
        })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        self.indices.binary_search(&(y * self.width + x)).is_ok()
    }

    /// Replaces every flagged pixel with the mean of its four direct same-colour neighbours.
    pub fn correct(&self, frame: &Mosaic, mosaic_pattern_width: usize) -> Mosaic {
        debug_assert_eq!(frame.dimensions(), (self.width, self.height));
        let p = mosaic_pattern_width.max(1);
        let mut corrected = frame.clone();
        for &index in &self.indices {
            let (x, y) = (index % self.width, index / self.width);
            let repaired = (frame[(x - p, y)] + frame[(x + p, y)] + frame[(x, y - p)] + frame[(x, y + p)]) * 0.25;
            corrected.pixels_mut()[index] = repaired;
        }
        corrected
    }
}
