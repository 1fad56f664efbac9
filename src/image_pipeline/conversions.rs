//! Pipeline conversions module
//!
//! Orchestrates decoding a burst, merging it and encoding the result.

mod burst_to_tiff;

pub use burst_to_tiff::BurstToTiffPipeline;
