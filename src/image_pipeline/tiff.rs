//! TIFF writing module
//!
//! Encodes the merged mosaic as a single-channel 16-bit TIFF.

mod writer;
mod standard_tiff_writer;
pub mod types;

pub use writer::TiffWriter;
pub use standard_tiff_writer::StandardTiffWriter;
pub use types::{TiffCompression, TiffConfig, TiffConfigBuilder};
