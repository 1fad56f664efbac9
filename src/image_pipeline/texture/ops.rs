use rayon::prelude::*;

use super::buffer::{ImageBuffer, Mosaic, Rgba};
use crate::image_pipeline::common::{BufferFormat, BufferKey, ComputeContext};

/// Per-side padding, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Padding {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

impl Padding {
    pub const fn new(left: usize, right: usize, top: usize, bottom: usize) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    pub const fn symmetric(x: usize, y: usize) -> Self {
        Self::new(x, x, y, y)
    }

    pub const fn horizontal(&self) -> usize {
        self.left + self.right
    }

    pub const fn vertical(&self) -> usize {
        self.top + self.bottom
    }
}

impl<T: Copy + Default + Send + Sync> ImageBuffer<T> {
    /// Grows the buffer, filling the new border with `T::default()`.
    pub fn pad(&self, padding: Padding) -> Self {
        let (width, height) = self.dimensions();
        ImageBuffer::from_fn(
            width + padding.horizontal(),
            height + padding.vertical(),
            |x, y| {
                if x < padding.left || y < padding.top {
                    return T::default();
                }
                let (sx, sy) = (x - padding.left, y - padding.top);
                if sx >= width || sy >= height {
                    T::default()
                } else {
                    self[(sx, sy)]
                }
            },
        )
    }

    /// Removes `padding` from every side. Inverse of [`ImageBuffer::pad`].
    pub fn crop(&self, padding: Padding) -> Self {
        assert!(
            padding.horizontal() <= self.width() && padding.vertical() <= self.height(),
            "crop {padding:?} exceeds {}x{}",
            self.width(),
            self.height()
        );
        ImageBuffer::from_fn(
            self.width() - padding.horizontal(),
            self.height() - padding.vertical(),
            |x, y| self[(x + padding.left, y + padding.top)],
        )
    }
}

impl Mosaic {
    pub fn from_u16(width: usize, height: usize, data: &[u16]) -> Self {
        ImageBuffer::new(width, height, data.par_iter().map(|&v| f32::from(v)).collect())
    }

    /// Scales, rounds and clamps every sample into the u16 range.
    pub fn to_u16(&self, scale: f32) -> Vec<u16> {
        self.pixels()
            .par_iter()
            .map(|&v| (v * scale).round().clamp(0.0, f32::from(u16::MAX)) as u16)
            .collect()
    }

    pub fn add_scaled(&mut self, other: &Mosaic, scale: f32) {
        assert_eq!(self.dimensions(), other.dimensions());
        self.pixels_mut()
            .par_iter_mut()
            .zip(other.pixels().par_iter())
            .for_each(|(a, &b)| *a += b * scale);
    }

    pub fn scale(&mut self, factor: f32) {
        self.pixels_mut().par_iter_mut().for_each(|v| *v *= factor);
    }

    pub fn mean(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.pixels().par_iter().map(|&v| f64::from(v)).sum();
        (sum / self.len() as f64) as f32
    }

    pub fn max_value(&self) -> f32 {
        self.pixels()
            .par_iter()
            .copied()
            .reduce(|| f32::MIN, f32::max)
    }

    /// Box-averages `scale`x`scale` blocks after subtracting `black_level`.
    ///
    /// With `color_factors` (R, G, B) each sample of a 2x2 Bayer block is
    /// multiplied by its factor relative to their mean, so that differently
    /// coloured channels contribute comparably to the pooled value.
    pub fn avg_pool(&self, scale: usize, black_level: f32, color_factors: Option<[f32; 3]>) -> Mosaic {
        let scale = scale.max(1);
        let norm = color_factors.map(|f| {
            let mean = (f[0] + f[1] + f[2]) / 3.0;
            [f[0] / mean, f[1] / mean, f[1] / mean, f[2] / mean]
        });
        let inv_area = 1.0 / (scale * scale) as f32;

        ImageBuffer::from_fn(self.width() / scale, self.height() / scale, |x, y| {
            let (x0, y0) = (x * scale, y * scale);
            let mut sum = 0.0;
            for dy in 0..scale {
                for dx in 0..scale {
                    let mut v = self[(x0 + dx, y0 + dy)] - black_level;
                    if let Some(norm) = norm {
                        v *= norm[(dy % 2) * 2 + dx % 2];
                    }
                    sum += v;
                }
            }
            sum * inv_area
        })
    }

    /// Separable binomial blur that only mixes samples of the same mosaic colour.
    ///
    /// Taps are `mosaic_pattern_width` pixels apart with weights `C(2k, k + i)`
    /// for `i` in `-k..=k`, renormalised where taps fall outside the image.
    pub fn blur_mosaic(&self, ctx: &ComputeContext, mosaic_pattern_width: usize, kernel_size: usize) -> Mosaic {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 || kernel_size == 0 {
            return self.clone();
        }
        let weights = binomial_weights(kernel_size);
        let step = mosaic_pattern_width.max(1);

        let mut horizontal = ctx
            .buffers()
            .acquire(BufferKey::new(width, height, BufferFormat::Scalar));
        horizontal
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, out_row)| {
                let row = self.row(y);
                for (x, out) in out_row.iter_mut().enumerate() {
                    *out = binomial_tap(&weights, x, width, step, |i| row[i]);
                }
            });

        let horizontal: &[f32] = &horizontal;
        let mut blurred = vec![0.0; width * height];
        blurred
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, out_row)| {
                for (x, out) in out_row.iter_mut().enumerate() {
                    *out = binomial_tap(&weights, y, height, step, |i| horizontal[i * width + x]);
                }
            });

        ImageBuffer::new(width, height, blurred)
    }

    /// Sum of absolute differences over each mosaic super-pixel.
    pub fn color_difference(&self, other: &Mosaic, mosaic_pattern_width: usize) -> Mosaic {
        assert_eq!(self.dimensions(), other.dimensions());
        let mw = mosaic_pattern_width.max(1);
        ImageBuffer::from_fn(self.width() / mw, self.height() / mw, |x, y| {
            let mut sum = 0.0;
            for dy in 0..mw {
                for dx in 0..mw {
                    let p = (x * mw + dx, y * mw + dy);
                    sum += (self[p] - other[p]).abs();
                }
            }
            sum
        })
    }

    /// Packs each 2x2 block into one four-channel pixel.
    pub fn to_rgba(&self) -> Rgba {
        ImageBuffer::from_fn(self.width() / 2, self.height() / 2, |x, y| {
            let (x0, y0) = (2 * x, 2 * y);
            [
                self[(x0, y0)],
                self[(x0 + 1, y0)],
                self[(x0, y0 + 1)],
                self[(x0 + 1, y0 + 1)],
            ]
        })
    }

    /// Bilinear resize, sampling at pixel centres with edge clamping.
    pub fn upsample_bilinear(&self, width: usize, height: usize) -> Mosaic {
        let (sw, sh) = self.dimensions();
        if sw == 0 || sh == 0 {
            return ImageBuffer::new_default(width, height);
        }
        let (scale_x, scale_y) = (sw as f32 / width as f32, sh as f32 / height as f32);
        let (max_x, max_y) = ((sw - 1) as f32, (sh - 1) as f32);

        ImageBuffer::from_fn(width, height, |x, y| {
            let fx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, max_x);
            let fy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, max_y);
            let (x0, y0) = (fx as usize, fy as usize);
            let (x1, y1) = ((x0 + 1).min(sw - 1), (y0 + 1).min(sh - 1));
            let (tx, ty) = (fx - x0 as f32, fy - y0 as f32);

            let top = self[(x0, y0)] * (1.0 - tx) + self[(x1, y0)] * tx;
            let bottom = self[(x0, y1)] * (1.0 - tx) + self[(x1, y1)] * tx;
            top * (1.0 - ty) + bottom * ty
        })
    }
}

impl Rgba {
    /// Inverse of [`Mosaic::to_rgba`].
    pub fn to_mosaic(&self) -> Mosaic {
        ImageBuffer::from_fn(self.width() * 2, self.height() * 2, |x, y| {
            self[(x / 2, y / 2)][(y % 2) * 2 + x % 2]
        })
    }
}

/// Nearest-neighbour resize.
pub fn upsample_nearest<T: Copy + Send + Sync>(src: &ImageBuffer<T>, width: usize, height: usize) -> ImageBuffer<T> {
    let (sw, sh) = src.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        src[((x * sw / width).min(sw - 1), (y * sh / height).min(sh - 1))]
    })
}

/// One side of a binomial kernel: `C(2k, k + i)` for `i` in `0..=k`, peak normalised to 1.
pub fn binomial_weights(kernel_size: usize) -> Vec<f32> {
    let n = 2 * kernel_size;
    let mut row = vec![1.0f64; n + 1];
    for j in 0..n {
        row[j + 1] = row[j] * (n - j) as f64 / (j + 1) as f64;
    }
    let peak = row[kernel_size];
    row[kernel_size..].iter().map(|&c| (c / peak) as f32).collect()
}

/// Clamps `pos` into `0..len` without changing its position within the mosaic period.
pub fn clamp_same_phase(pos: isize, len: usize, period: usize) -> usize {
    let period = period.max(1) as isize;
    let len = len as isize;
    if pos < 0 {
        pos.rem_euclid(period).min(len - 1) as usize
    } else if pos >= len {
        let last = len - 1;
        let mut clamped = last - last.rem_euclid(period) + pos.rem_euclid(period);
        if clamped > last {
            clamped -= period;
        }
        clamped.max(0) as usize
    } else {
        pos as usize
    }
}

#[inline]
fn binomial_tap(weights: &[f32], center: usize, len: usize, step: usize, sample: impl Fn(usize) -> f32) -> f32 {
    let mut total = weights[0] * sample(center);
    let mut norm = weights[0];
    for (i, &w) in weights.iter().enumerate().skip(1) {
        let offset = i * step;
        if center >= offset {
            total += w * sample(center - offset);
            norm += w;
        }
        if center + offset < len {
            total += w * sample(center + offset);
            norm += w;
        }
    }
    total / norm
}
