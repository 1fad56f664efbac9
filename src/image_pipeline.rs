//! Burst align-and-merge pipeline
//!
//! Decodes a burst of RAW frames, aligns every frame to a reference on a
//! tile pyramid, merges them in the frequency or spatial domain and writes
//! the merged mosaic as TIFF.

pub mod common;
pub mod texture;
pub mod align;
pub mod merge;
pub mod radiometry;
pub mod raw;
pub mod tiff;
pub mod conversions;

pub use common::{
    ComputeContext,
    MergeError,
    Result,
};

pub use merge::{
    BurstFrame,
    BurstMerger,
    ExposureControl,
    MergeConfig,
    MergeConfigBuilder,
    MergedFrame,
    MergedImage,
    MergingAlgorithm,
    OutputBitDepth,
    SearchDistance,
    TileSize,
};

pub use raw::{
    FrameMetadata,
    RawImageData,
    RawImageReader,
    RawLoaderReader,
};

pub use tiff::{
    TiffCompression,
    TiffConfig,
    TiffConfigBuilder,
    TiffWriter,
    StandardTiffWriter,
};

pub use conversions::{
    BurstToTiffPipeline,
};
