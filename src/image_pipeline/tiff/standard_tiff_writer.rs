use std::io::{Cursor, Write};

use tiff::encoder::compression::DeflateLevel;
use tiff::encoder::{Compression, TiffEncoder, colortype};
use tiff::tags::Predictor;
use tracing::debug;

use crate::image_pipeline::common::error::{MergeError, Result};
use crate::image_pipeline::raw::types::RawImageData;
use crate::image_pipeline::tiff::types::{TiffCompression, TiffConfig};
use crate::image_pipeline::tiff::writer::TiffWriter;

/// Writes the mosaic as one Gray16 strip image.
pub struct StandardTiffWriter;

fn encoder_compression(compression: TiffCompression) -> Compression {
    match compression {
        TiffCompression::None => Compression::Uncompressed,
        TiffCompression::Lzw => Compression::Lzw,
        TiffCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
        TiffCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
        TiffCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
    }
}

impl TiffWriter for StandardTiffWriter {
    fn write_tiff(&self, image: &RawImageData, output: &mut dyn Write, config: &TiffConfig) -> Result<()> {
        debug!(
            "Encoding TIFF image: {}x{}, {} bits per sample",
            image.width, image.height, image.bits_per_sample
        );

        let mut buffer = Vec::new();

        let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
            .map_err(|e| MergeError::EncodeError(e.to_string()))?
            .with_compression(encoder_compression(config.compression));

        if let Some(predictor_val) = config.predictor {
            let predictor = match predictor_val {
                2 => Predictor::Horizontal,
                _ => Predictor::None,
            };
            encoder = encoder.with_predictor(predictor);
        }

        encoder
            .write_image::<colortype::Gray16>(image.width as u32, image.height as u32, &image.data)
            .map_err(|e| MergeError::EncodeError(e.to_string()))?;

        output.write_all(&buffer)?;

        debug!(bytes = buffer.len(), "TIFF encoding complete");
        Ok(())
    }
}
