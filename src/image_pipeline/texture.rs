//! Pixel buffers and the image operations the merge stages are built from.

mod buffer;
mod ops;

pub use buffer::{ImageBuffer, Mosaic, Rgba};
pub use ops::{Padding, binomial_weights, clamp_same_phase, upsample_nearest};
