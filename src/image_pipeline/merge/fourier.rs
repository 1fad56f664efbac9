use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

/// Tile edge served by the hand-written transform.
const RADIX8_SIZE: usize = 8;

const FRAC_1_SQRT_2: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// `exp(-2 pi i k / 8)` for `k` in `0..4`.
const TWIDDLES_8: [Complex32; 4] = [
    Complex32::new(1.0, 0.0),
    Complex32::new(FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
    Complex32::new(0.0, -1.0),
    Complex32::new(-FRAC_1_SQRT_2, -FRAC_1_SQRT_2),
];

/// 2D discrete Fourier transform of square tiles, row-major, in place.
///
/// 8x8 tiles use an unrolled radix-2 transform; other sizes go through rustfft.
/// `inverse` is normalised so that `inverse(forward(x)) == x`.
#[derive(Clone)]
pub enum TileTransform {
    Radix8,
    Planned {
        size: usize,
        forward: Arc<dyn Fft<f32>>,
        inverse: Arc<dyn Fft<f32>>,
    },
}

impl fmt::Debug for TileTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileTransform::Radix8 => write!(f, "TileTransform::Radix8"),
            TileTransform::Planned { size, .. } => write!(f, "TileTransform::Planned({size})"),
        }
    }
}

impl TileTransform {
    pub fn new(size: usize) -> Self {
        if size == RADIX8_SIZE {
            TileTransform::Radix8
        } else {
            Self::planned(size)
        }
    }

    /// rustfft-backed transform for any size.
    pub fn planned(size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        TileTransform::Planned {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            TileTransform::Radix8 => RADIX8_SIZE,
            TileTransform::Planned { size, .. } => *size,
        }
    }

    pub fn forward(&self, tile: &mut [Complex32]) {
        debug_assert_eq!(tile.len(), self.size() * self.size());
        match self {
            TileTransform::Radix8 => transform_2d_radix8(tile),
            TileTransform::Planned { size, forward, .. } => transform_2d_planned(tile, *size, forward.as_ref()),
        }
    }

    pub fn inverse(&self, tile: &mut [Complex32]) {
        debug_assert_eq!(tile.len(), self.size() * self.size());
        match self {
            TileTransform::Radix8 => {
                // Conjugation turns the forward transform into the inverse.
                tile.iter_mut().for_each(|c| *c = c.conj());
                transform_2d_radix8(tile);
                tile.iter_mut().for_each(|c| *c = c.conj());
            }
            TileTransform::Planned { size, inverse, .. } => transform_2d_planned(tile, *size, inverse.as_ref()),
        }
        let scale = 1.0 / tile.len() as f32;
        tile.iter_mut().for_each(|c| *c *= scale);
    }
}

fn fft8(x: [Complex32; 8]) -> [Complex32; 8] {
    // Bit-reversed input order.
    let a = [x[0], x[4], x[2], x[6], x[1], x[5], x[3], x[7]];

    let mut s = [Complex32::default(); 8];
    for i in (0..8).step_by(2) {
        s[i] = a[i] + a[i + 1];
        s[i + 1] = a[i] - a[i + 1];
    }

    let mut t = [Complex32::default(); 8];
    for base in [0, 4] {
        for k in 0..2 {
            let u = s[base + k];
            let v = s[base + k + 2] * TWIDDLES_8[2 * k];
            t[base + k] = u + v;
            t[base + k + 2] = u - v;
        }
    }

    let mut out = [Complex32::default(); 8];
    for k in 0..4 {
        let u = t[k];
        let v = t[k + 4] * TWIDDLES_8[k];
        out[k] = u + v;
        out[k + 4] = u - v;
    }
    out
}

fn transform_2d_radix8(tile: &mut [Complex32]) {
    let n = RADIX8_SIZE;
    for row in tile.chunks_exact_mut(n) {
        let mut values = [Complex32::default(); 8];
        values.copy_from_slice(row);
        row.copy_from_slice(&fft8(values));
    }
    for col in 0..n {
        let mut values = [Complex32::default(); 8];
        for (r, v) in values.iter_mut().enumerate() {
            *v = tile[r * n + col];
        }
        for (r, v) in fft8(values).into_iter().enumerate() {
            tile[r * n + col] = v;
        }
    }
}

fn transpose_square(tile: &mut [Complex32], n: usize) {
    for r in 0..n {
        for c in r + 1..n {
            tile.swap(r * n + c, c * n + r);
        }
    }
}

fn transform_2d_planned(tile: &mut [Complex32], n: usize, fft: &dyn Fft<f32>) {
    // rustfft processes every consecutive row of the buffer.
    fft.process(tile);
    transpose_square(tile, n);
    fft.process(tile);
    transpose_square(tile, n);
}
