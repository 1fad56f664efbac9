use rayon::prelude::*;
use rustfft::num_complex::Complex32;
use tracing::{debug, info_span};

use super::burst::PreparedBurst;
use super::fourier::TileTransform;
use crate::image_pipeline::align::{AlignmentSchedule, Pyramid, TileAligner, padding_for};
use crate::image_pipeline::common::ComputeContext;
use crate::image_pipeline::texture::{ImageBuffer, Mosaic, Padding, Rgba};

/// Merge tile edge in the four-channel image.
pub const MERGE_TILE_SIZE: usize = 8;
/// Offset between the four merge passes, in mosaic pixels (half a merge tile).
const PASS_SHIFT: usize = MERGE_TILE_SIZE;
const PASS_COUNT: usize = 4;

/// Mean tile mismatch after normalisation.
const MISMATCH_TARGET_MEAN: f32 = 0.12;
const MOTION_NORM_START: f32 = 0.02;
const MOTION_NORM_RANGE: f32 = 0.15;
/// Tiles whose burst-average mismatch reaches this get no deconvolution.
const DECONVOLUTION_MISMATCH_LIMIT: f32 = 0.3;
/// Largest extra gain at the highest frequencies.
const DECONVOLUTION_MAX_GAIN: f32 = 0.08;
/// Normalised brightness above which comparison tiles count as near clipping.
const HIGHLIGHT_KNEE: f32 = 0.9;
const MIN_HIGHLIGHT_NORM: f32 = 0.01;
const UNKNOWN_WHITE_LEVEL: f32 = 1_000_000.0;
const EPSILON: f32 = 1e-12;

/// Noise parameters derived from the noise-reduction setting and the burst exposures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    pub robustness_norm: f32,
    pub read_noise: f32,
    pub max_motion_norm: f32,
}

impl NoiseModel {
    pub fn new(noise_reduction: f64, burst: &PreparedBurst) -> Self {
        let count = burst.len() as f64;
        let (mut corr1, mut corr2) = (0.0, 0.0);
        for index in 0..burst.len() {
            let factor = f64::from(burst.exposure_factor(index));
            corr1 += 0.5 + 0.5 / factor;
            corr2 += factor.min(4.0);
        }
        Self::from_parameters(noise_reduction, burst.uniform_exposure(), corr1 / count, corr2 / count)
    }

    pub fn from_parameters(noise_reduction: f64, uniform_exposure: bool, exposure_corr1: f64, exposure_corr2: f64) -> Self {
        let strength = (noise_reduction + 0.5).floor();
        let base = if uniform_exposure { 26.5 } else { 28.5 };
        let robustness_rev = 0.5 * (base - strength);

        Self {
            robustness_norm: (exposure_corr1 / exposure_corr2 * 2f64.powf(-robustness_rev + 7.5)) as f32,
            read_noise: 2f64.powf(-robustness_rev + 10.0).powf(1.6) as f32,
            max_motion_norm: 1.3f64.powf(11.0 - robustness_rev).max(1.0) as f32,
        }
    }

    /// Noise scaling for a tile: `max_motion_norm` on static tiles falling to 1 as mismatch grows.
    pub fn motion_norm(&self, mismatch: f32, max_motion_norm: f32) -> f32 {
        let max = max_motion_norm.max(1.0);
        (max - (mismatch - MOTION_NORM_START) * (max - 1.0) / MOTION_NORM_RANGE).clamp(1.0, max)
    }
}

/// Per-tile spectra of a four-channel image, laid out `[tile][channel][coefficient]`.
#[derive(Debug, Clone)]
struct TileSpectra {
    tiles_x: usize,
    tiles_y: usize,
    tile_size: usize,
    data: Vec<Complex32>,
}

impl TileSpectra {
    fn plane_len(&self) -> usize {
        self.tile_size * self.tile_size
    }

    fn tile(&self, index: usize) -> &[Complex32] {
        let len = 4 * self.plane_len();
        &self.data[index * len..(index + 1) * len]
    }

    fn forward(image: &Rgba, transform: &TileTransform) -> Self {
        let t = transform.size();
        let (tiles_x, tiles_y) = (image.width() / t, image.height() / t);
        let mut data = vec![Complex32::default(); tiles_x * tiles_y * 4 * t * t];

        data.par_chunks_mut(4 * t * t).enumerate().for_each(|(tile, chunk)| {
            let (x0, y0) = ((tile % tiles_x) * t, (tile / tiles_x) * t);
            for (channel, plane) in chunk.chunks_mut(t * t).enumerate() {
                for (k, coefficient) in plane.iter_mut().enumerate() {
                    *coefficient = Complex32::new(image[(x0 + k % t, y0 + k / t)][channel], 0.0);
                }
                transform.forward(plane);
            }
        });

        Self {
            tiles_x,
            tiles_y,
            tile_size: t,
            data,
        }
    }

    fn inverse(&self, transform: &TileTransform, scale: f32) -> Rgba {
        let t = self.tile_size;
        let plane_len = self.plane_len();
        let (width, height) = (self.tiles_x * t, self.tiles_y * t);
        let mut pixels = vec![[0.0f32; 4]; width * height];

        pixels.par_chunks_mut(width * t).enumerate().for_each(|(ty, band)| {
            let mut plane = vec![Complex32::default(); plane_len];
            for tx in 0..self.tiles_x {
                let tile = self.tile(ty * self.tiles_x + tx);
                for channel in 0..4 {
                    plane.copy_from_slice(&tile[channel * plane_len..(channel + 1) * plane_len]);
                    transform.inverse(&mut plane);
                    for (k, value) in plane.iter().enumerate() {
                        band[(k / t) * width + tx * t + k % t][channel] = value.re * scale;
                    }
                }
            }
        });

        ImageBuffer::new(width, height, pixels)
    }
}

/// Frequency-domain merge of Bayer bursts.
///
/// Runs four passes whose tile grids are offset by half a merge tile and
/// averages them, which hides tile seams. In each pass every comparison frame
/// is aligned, and each tile's spectrum is pulled toward the reference where
/// it differs by more than the expected noise.
pub struct FrequencyMerger<'a> {
    ctx: &'a ComputeContext,
    schedule: &'a AlignmentSchedule,
    transform: TileTransform,
    noise: NoiseModel,
}

impl<'a> FrequencyMerger<'a> {
    pub fn new(ctx: &'a ComputeContext, schedule: &'a AlignmentSchedule, noise: NoiseModel) -> Self {
        Self {
            ctx,
            schedule,
            transform: TileTransform::new(MERGE_TILE_SIZE),
            noise,
        }
    }

    pub fn merge(&self, burst: &PreparedBurst) -> Mosaic {
        let (width, height) = burst.reference().dimensions();
        let mosaic_pattern_width = burst.mosaic_pattern_width();
        let tile_factor = self.schedule.tile_factor();

        let (pad_left, pad_right) = padding_for(width, PASS_SHIFT, tile_factor, mosaic_pattern_width);
        let (pad_top, pad_bottom) = padding_for(height, PASS_SHIFT, tile_factor, mosaic_pattern_width);
        // Keeps whole merge tiles of padding out of the transforms.
        let crop_unit = 2 * MERGE_TILE_SIZE;
        let crop = Padding::symmetric(pad_left / crop_unit * crop_unit, pad_top / crop_unit * crop_unit);

        debug!(noise = ?self.noise, tile_factor, ?crop, "Frequency merge geometry");

        let mut merged = Mosaic::new_default(width, height);
        for pass in 0..PASS_COUNT {
            let _span = info_span!("frequency_pass", pass).entered();
            let shift_left = if pass % 2 == 1 { PASS_SHIFT } else { 0 };
            let shift_top = if pass < 2 { PASS_SHIFT } else { 0 };
            let padding = Padding::new(
                pad_left + shift_left,
                pad_right + PASS_SHIFT - shift_left,
                pad_top + shift_top,
                pad_bottom + PASS_SHIFT - shift_top,
            );

            let output = self.merge_pass(burst, padding, crop);
            merged.add_scaled(&output, 1.0 / PASS_COUNT as f32);
        }
        merged
    }

    fn merge_pass(&self, burst: &PreparedBurst, padding: Padding, crop: Padding) -> Mosaic {
        let reference = burst.reference();
        let ref_padded = reference.pixels.pad(padding);
        let ref_rgba = ref_padded.crop(crop).to_rgba();
        let ref_pyramid = Pyramid::build(self.ctx, &ref_padded, self.schedule, reference.pyramid_params());

        let black = reference.metadata.black_levels_f32();
        let rms = tile_rms(&ref_rgba, MERGE_TILE_SIZE, black.unwrap_or([0.0; 4]));
        let ref_spectrum = TileSpectra::forward(&ref_rgba, &self.transform);
        let mut accumulator = ref_spectrum.clone();
        let mut total_mismatch = Mosaic::new_default(rms.width(), rms.height());

        let aligner = TileAligner::new(self.ctx, self.schedule);
        let exposure = burst.exposure_mode();
        let comparisons = burst.comparison_indices();
        let aligned: Vec<(usize, Rgba)> = comparisons
            .par_iter()
            .map(|&index| {
                let frame = &burst.frames()[index];
                let warped = aligner.align(&ref_pyramid, &frame.pixels.pad(padding), frame.pyramid_params(), exposure);
                (index, warped.crop(crop).to_rgba())
            })
            .collect();

        let uniform = burst.uniform_exposure();
        let white = reference.metadata.white_level.map_or(UNKNOWN_WHITE_LEVEL, |w| w as f32);
        let black_mean = reference.metadata.black_level_mean().unwrap_or(0.0);
        let comparison_weight = 1.0 / comparisons.len().max(1) as f32;

        for (index, aligned_rgba) in &aligned {
            let exposure_factor = burst.exposure_factor(*index);

            let mut mismatch = tile_mismatch(&ref_rgba, aligned_rgba, &rms, exposure_factor, MERGE_TILE_SIZE);
            let mean = mean_mismatch(&mismatch, &rms);
            normalize_mismatch(&mut mismatch, mean);
            total_mismatch.add_scaled(&mismatch, comparison_weight);

            let highlights = (!uniform)
                .then(|| highlights_norm(aligned_rgba, MERGE_TILE_SIZE, exposure_factor, white, black_mean));
            let max_motion_norm = if uniform {
                self.noise.max_motion_norm
            } else {
                exposure_factor.min(4.0) * self.noise.max_motion_norm.sqrt()
            };

            let aligned_spectrum = TileSpectra::forward(aligned_rgba, &self.transform);
            merge_tiles(
                &ref_spectrum,
                &aligned_spectrum,
                &mut accumulator,
                &rms,
                &mismatch,
                highlights.as_ref(),
                &self.noise,
                max_motion_norm,
            );
            debug!(frame = *index, mean_mismatch = mean, "Frame merged");
        }

        deconvolute(&mut accumulator, &ref_spectrum, &total_mismatch, burst.len());
        let mut output = accumulator.inverse(&self.transform, 1.0 / burst.len() as f32);

        match black {
            Some(black) => {
                let ceiling = reference.metadata.white_level.map_or(f32::from(u16::MAX), |w| w as f32);
                reduce_tile_border_artifacts(&mut output, &ref_rgba, MERGE_TILE_SIZE, black, ceiling);
            }
            None => debug!("Black levels unknown, tile border artifact reduction skipped"),
        }

        let remaining = Padding::new(
            padding.left - crop.left,
            padding.right - crop.right,
            padding.top - crop.top,
            padding.bottom - crop.bottom,
        );
        output.to_mosaic().crop(remaining)
    }
}

/// Per-tile, per-channel signal level above black, used as the shot-noise proxy.
fn tile_rms(reference: &Rgba, tile_size: usize, black: [f32; 4]) -> ImageBuffer<[f32; 4]> {
    let t = tile_size;
    ImageBuffer::from_fn(reference.width() / t, reference.height() / t, |tx, ty| {
        let mut sum = [0.0f32; 4];
        for dy in 0..t {
            for dx in 0..t {
                let pixel = reference[(tx * t + dx, ty * t + dy)];
                for c in 0..4 {
                    let v = (pixel[c] - black[c]).max(0.0);
                    sum[c] += v * v;
                }
            }
        }
        sum.map(|s| 0.25 * s.sqrt() / t as f32)
    })
}

/// Mean absolute difference per tile, normalised by the expected noise.
fn tile_mismatch(
    reference: &Rgba,
    aligned: &Rgba,
    rms: &ImageBuffer<[f32; 4]>,
    exposure_factor: f32,
    tile_size: usize,
) -> Mosaic {
    let t = tile_size;
    let area = (t * t) as f32;
    ImageBuffer::from_fn(rms.width(), rms.height(), |tx, ty| {
        let mut diff = [0.0f32; 4];
        for dy in 0..t {
            for dx in 0..t {
                let p = (tx * t + dx, ty * t + dy);
                let (r, a) = (reference[p], aligned[p]);
                for c in 0..4 {
                    diff[c] += (r[c] - a[c]).abs();
                }
            }
        }
        let noise = rms[(tx, ty)];
        0.25 * (0..4)
            .map(|c| diff[c] / area / (0.5 * noise[c] + 0.5 * noise[c] / exposure_factor + 1.0).sqrt())
            .sum::<f32>()
    })
}

/// Mean mismatch over tiles that carry image signal; all-padding tiles would drag it down.
fn mean_mismatch(mismatch: &Mosaic, rms: &ImageBuffer<[f32; 4]>) -> f32 {
    let (sum, count) = mismatch
        .pixels()
        .iter()
        .zip(rms.pixels())
        .filter(|(_, noise)| noise.iter().any(|&n| n > 0.0))
        .fold((0.0f64, 0usize), |(sum, count), (&m, _)| (sum + f64::from(m), count + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

fn normalize_mismatch(mismatch: &mut Mosaic, mean: f32) {
    let factor = MISMATCH_TARGET_MEAN / (mean + EPSILON);
    mismatch
        .pixels_mut()
        .iter_mut()
        .for_each(|m| *m = (*m * factor).clamp(0.0, 1.0));
}

/// Per-tile factor below 1 where the comparison frame was close to clipping in its own exposure.
fn highlights_norm(aligned: &Rgba, tile_size: usize, exposure_factor: f32, white: f32, black: f32) -> Mosaic {
    let t = tile_size;
    let range = (white - black).max(1.0);
    ImageBuffer::from_fn(aligned.width() / t, aligned.height() / t, |tx, ty| {
        let mut peak = f32::MIN;
        for dy in 0..t {
            for dx in 0..t {
                let pixel = aligned[(tx * t + dx, ty * t + dy)];
                peak = pixel.iter().copied().fold(peak, f32::max);
            }
        }
        let level = (peak - black) * exposure_factor / range;
        if level > HIGHLIGHT_KNEE {
            ((1.0 - level) / (1.0 - HIGHLIGHT_KNEE)).clamp(MIN_HIGHLIGHT_NORM, 1.0)
        } else {
            1.0
        }
    })
}

/// Adds one aligned frame to the accumulator with a per-coefficient Wiener weight.
///
/// `weight = |D|^2 / (|D|^2 + noise)` with `D = reference - aligned`; a weight
/// of 1 takes the reference coefficient and 0 the aligned one.
#[allow(clippy::too_many_arguments)]
fn merge_tiles(
    reference: &TileSpectra,
    aligned: &TileSpectra,
    accumulator: &mut TileSpectra,
    rms: &ImageBuffer<[f32; 4]>,
    mismatch: &Mosaic,
    highlights: Option<&Mosaic>,
    noise: &NoiseModel,
    max_motion_norm: f32,
) {
    let plane_len = reference.plane_len();
    let tile_area = plane_len as f32;

    accumulator
        .data
        .par_chunks_mut(4 * plane_len)
        .enumerate()
        .for_each(|(tile, acc)| {
            let motion_norm = noise.motion_norm(mismatch.pixels()[tile], max_motion_norm);
            let highlight = highlights.map_or(1.0, |h| h.pixels()[tile]);
            let tile_rms = rms.pixels()[tile];
            let ref_tile = reference.tile(tile);
            let aligned_tile = aligned.tile(tile);

            for channel in 0..4 {
                let noise_var = tile_area
                    * motion_norm
                    * highlight
                    * (noise.robustness_norm * tile_rms[channel] + noise.read_noise);
                let range = channel * plane_len..(channel + 1) * plane_len;

                for ((out, &r), &a) in acc[range.clone()]
                    .iter_mut()
                    .zip(&ref_tile[range.clone()])
                    .zip(&aligned_tile[range])
                {
                    let diff = r - a;
                    let magnitude = diff.norm_sqr();
                    let denominator = magnitude + noise_var;
                    let weight = if denominator > EPSILON { magnitude / denominator } else { 0.0 };
                    *out += a + diff * weight;
                }
            }
        });
}

/// Gently restores high-frequency magnitude lost to averaging in static tiles.
///
/// The gain never exceeds the reference's own magnitude and stays at 1 for the
/// DC term, so a merge of identical frames is left untouched.
fn deconvolute(accumulator: &mut TileSpectra, reference: &TileSpectra, total_mismatch: &Mosaic, frame_count: usize) {
    let t = accumulator.tile_size;
    let plane_len = accumulator.plane_len();
    let half = (t / 2).max(1) as f32;
    let frequency_gain: Vec<f32> = (0..plane_len)
        .map(|k| {
            let (u, v) = (k % t, k / t);
            let distance = u.min(t - u).max(v.min(t - v));
            DECONVOLUTION_MAX_GAIN * distance as f32 / half
        })
        .collect();
    let inv_count = 1.0 / frame_count as f32;

    accumulator
        .data
        .par_chunks_mut(4 * plane_len)
        .enumerate()
        .for_each(|(tile, acc)| {
            let mismatch = total_mismatch.pixels()[tile];
            if mismatch >= DECONVOLUTION_MISMATCH_LIMIT {
                return;
            }
            let strength = 1.0 - mismatch / DECONVOLUTION_MISMATCH_LIMIT;
            let ref_tile = reference.tile(tile);

            for (k, (out, r)) in acc.iter_mut().zip(ref_tile).enumerate() {
                let cap = 1.0 + strength * frequency_gain[k % plane_len];
                if cap <= 1.0 {
                    continue;
                }
                let merged = out.norm() * inv_count;
                if merged > EPSILON {
                    *out *= (r.norm() / merged).clamp(1.0, cap);
                }
            }
        });
}

/// On tile-edge pixels, falls back to the reference where the merge left the valid range.
fn reduce_tile_border_artifacts(output: &mut Rgba, reference: &Rgba, tile_size: usize, black: [f32; 4], white: f32) {
    let t = tile_size;
    let width = output.width();
    let on_edge = |i: usize| i % t == 0 || i % t == t - 1;

    output
        .pixels_mut()
        .par_chunks_mut(width)
        .zip(reference.pixels().par_chunks(width))
        .enumerate()
        .for_each(|(y, (out_row, ref_row))| {
            let edge_row = on_edge(y);
            for (x, (out, r)) in out_row.iter_mut().zip(ref_row).enumerate() {
                if !edge_row && !on_edge(x) {
                    continue;
                }
                for c in 0..4 {
                    let valid = (black[c] - 1.0)..=white;
                    if !valid.contains(&out[c]) && valid.contains(&r[c]) {
                        out[c] = r[c];
                    }
                }
            }
        });
}
