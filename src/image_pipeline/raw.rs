//! RAW image reading module
//!
//! Format-agnostic RAW decoding plus the concurrent burst loader that feeds
//! decoded frames to the merge engine.

mod burst_loader;
mod exif_metadata;
mod reader;
mod rawloader_reader;
pub mod types;

pub use burst_loader::{load_burst, read_burst_files};
pub use exif_metadata::{ExposureInfo, read_exposure_info};
pub use reader::RawImageReader;
pub use rawloader_reader::RawLoaderReader;
pub use types::{FrameMetadata, RawImageData};
