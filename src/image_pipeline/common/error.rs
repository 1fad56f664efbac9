use thiserror::Error;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to read input file: {0}")]
    InputReadError(String),

    #[error("Failed to write output file: {0}")]
    OutputWriteError(String),

    #[error("Failed to decode RAW image: {0}")]
    DecodeError(String),

    #[error("Failed to encode TIFF image: {0}")]
    EncodeError(String),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error("A burst needs at least 2 frames, got {0}")]
    InsufficientFrames(usize),

    #[error(
        "Frame {index} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    InconsistentResolution {
        index: usize,
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("Frame {index} has mosaic pattern width {actual}, expected {expected}")]
    InconsistentMosaicPattern {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Bracketed exposures are only supported for Bayer sensors, got mosaic pattern width {0}")]
    UnsupportedSensorExposureCombination(usize),

    #[error("Invalid value '{value}' for option '{name}'")]
    InvalidOption { name: &'static str, value: String },

    #[error("Noise reduction must be within 1.0..=23.0, got {0}")]
    InvalidNoiseReduction(f64),

    #[error("Reference index {index} is out of range for a burst of {count} frames")]
    InvalidReferenceIndex { index: usize, count: usize },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;
