use tracing::warn;

use crate::image_pipeline::merge::{ExposureControl, OutputBitDepth};
use crate::image_pipeline::raw::types::FrameMetadata;
use crate::image_pipeline::texture::Mosaic;

const U16_BITS: u32 = 16;

/// Merged frame converted to output integers.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedFrame {
    pub data: Vec<u16>,
    pub bits_per_sample: u32,
    /// Factor applied to reach the 16-bit range, when one was applied.
    pub scale_16bit: Option<f64>,
}

fn native_bits(metadata: &FrameMetadata) -> u32 {
    match metadata.white_level.filter(|&w| w > 0) {
        Some(white) => (i32::BITS - white.leading_zeros()).min(U16_BITS),
        None => U16_BITS,
    }
}

/// Rounds and clamps the merged frame to u16.
///
/// 16-bit output stretches the white level to 65535 and needs a Bayer sensor,
/// an active exposure control and a known white level; otherwise the native
/// range is kept.
pub fn pack_bit_depth(
    pixels: &Mosaic,
    depth: OutputBitDepth,
    control: ExposureControl,
    metadata: &FrameMetadata,
) -> PackedFrame {
    if depth == OutputBitDepth::SixteenBit {
        let white = metadata.white_level.filter(|&w| w > 0);
        match white {
            Some(white) if metadata.is_bayer() && control != ExposureControl::Off => {
                let scale = f64::from(u16::MAX) / f64::from(white);
                return PackedFrame {
                    data: pixels.to_u16(scale as f32),
                    bits_per_sample: U16_BITS,
                    scale_16bit: Some(scale),
                };
            }
            _ => warn!(
                mosaic_pattern_width = metadata.mosaic_pattern_width,
                %control,
                "16-bit output needs a Bayer sensor, exposure control and a known white level; writing native bit depth"
            ),
        }
    }

    PackedFrame {
        data: pixels.to_u16(1.0),
        bits_per_sample: native_bits(metadata),
        scale_16bit: None,
    }
}
