//! Radiometric corrections around the merge
//!
//! Hot-pixel repair and exposure equalization run before alignment; exposure
//! correction and bit-depth packing run on the merged frame.

mod bit_depth;
mod exposure;
mod hot_pixels;

pub use bit_depth::{PackedFrame, pack_bit_depth};
pub use exposure::{correct_exposure, equalize_exposure, exposure_factor};
pub use hot_pixels::{HotPixelMap, correction_strength, detection_threshold};
