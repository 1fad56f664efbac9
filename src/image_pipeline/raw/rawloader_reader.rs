//! RAW image reader implementation using the rawloader library.
//!
//! Decodes the sensor mosaic of any format rawloader understands (ARW, CR2,
//! NEF, DNG, RAF...) together with the levels and colour metadata the merge
//! needs.

use std::io::Cursor;

use rawloader::RawImageData as RawloaderImageData;
use tracing::debug;

use crate::image_pipeline::common::error::{MergeError, Result};
use crate::image_pipeline::raw::exif_metadata::read_exposure_info;
use crate::image_pipeline::raw::reader::RawImageReader;
use crate::image_pipeline::raw::types::{FrameMetadata, RawImageData};

/// RAW image reader that uses the rawloader library for decoding.
pub struct RawLoaderReader;

/// Default bit depth when no white level information is available from the RAW file.
const DEFAULT_BITS_PER_SAMPLE: u32 = 16;

/// The bit width of the u16 data type, used for calculating actual bits per sample.
const U16_BITS: u32 = 16;

impl RawImageReader for RawLoaderReader {
    /// Decodes a RAW file held in memory.
    ///
    /// Float sensor data (normalised to 0..1) is scaled to the u16 range.
    /// Bits per sample come from the largest white level. rawloader reports
    /// unknown white-balance coefficients as NaN, which maps to no colour factors.
    /// Exposure bias, ISO and exposure time come from the file's EXIF block.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use burst_merge_rs::image_pipeline::raw::{RawImageReader, RawLoaderReader};
    ///
    /// let reader = RawLoaderReader;
    /// let raw_bytes = std::fs::read("frame_0.arw").unwrap();
    /// let frame = reader.read_raw(&raw_bytes).unwrap();
    /// println!("{}x{} mosaic", frame.width, frame.height);
    /// ```
    fn read_raw(&self, data: &[u8]) -> Result<RawImageData> {
        debug!("Decoding RAW image, {} bytes", data.len());

        let decoded = rawloader::decode(&mut Cursor::new(data))
            .map_err(|e| MergeError::DecodeError(e.to_string()))?;

        let width = decoded.width;
        let height = decoded.height;

        debug!("Decoded image: {}x{} ({})", width, height, decoded.cfa.name);

        let pixels: Vec<u16> = match &decoded.data {
            RawloaderImageData::Integer(values) => values.clone(),
            RawloaderImageData::Float(values) => {
                values.iter().map(|&v| (v * u16::MAX as f32) as u16).collect()
            }
        };

        let max_white_level = decoded.whitelevels.iter().max().copied().unwrap_or(u16::MAX);
        let bits_per_sample = if max_white_level == 0 {
            DEFAULT_BITS_PER_SAMPLE
        } else {
            // 4095 -> 12 bits, 16383 -> 14 bits
            U16_BITS - max_white_level.leading_zeros()
        };

        let wb = decoded.wb_coeffs;
        let color_factors = [wb[0], wb[1], wb[2]]
            .iter()
            .all(|c| c.is_finite() && *c > 0.0)
            .then(|| [f64::from(wb[0]), f64::from(wb[1]), f64::from(wb[2])]);

        let exposure = read_exposure_info(data);

        let metadata = FrameMetadata {
            mosaic_pattern_width: decoded.cfa.width.max(1),
            black_levels: Some(decoded.blacklevels.map(i32::from)),
            white_level: (max_white_level > 0).then_some(i32::from(max_white_level)),
            exposure_bias: exposure.exposure_bias,
            iso_exposure_time: exposure.iso_exposure_time,
            color_factors,
        };

        debug!(
            bits_per_sample,
            max_white_level,
            mosaic_pattern_width = metadata.mosaic_pattern_width,
            exposure_bias = metadata.exposure_bias,
            iso_exposure_time = metadata.iso_exposure_time,
            "Frame metadata extracted"
        );

        Ok(RawImageData {
            width,
            height,
            data: pixels,
            bits_per_sample,
            metadata,
        })
    }
}
