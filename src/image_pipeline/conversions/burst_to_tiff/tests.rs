use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use super::BurstToTiffPipeline;
use crate::image_pipeline::common::{MergeError, Result};
use crate::image_pipeline::merge::{MergeConfig, MergingAlgorithm, OutputBitDepth};
use crate::image_pipeline::raw::{FrameMetadata, RawImageData, RawImageReader};
use crate::image_pipeline::tiff::{TiffConfig, TiffWriter};

const WIDTH: usize = 64;
const HEIGHT: usize = 64;

/// Decodes the first input byte into a frame brightness offset.
struct MockReader {
    should_fail: bool,
    truncated: bool,
    width: usize,
    height: usize,
}

impl MockReader {
    fn new() -> Self {
        Self {
            should_fail: false,
            truncated: false,
            width: WIDTH,
            height: HEIGHT,
        }
    }
}

impl RawImageReader for MockReader {
    fn read_raw(&self, data: &[u8]) -> Result<RawImageData> {
        if self.should_fail {
            return Err(MergeError::DecodeError("Mock decode error".to_string()));
        }
        let offset = u16::from(data.first().copied().unwrap_or(0));
        let count = if self.truncated { self.width * self.height / 2 } else { self.width * self.height };
        let pixels = (0..count)
            .map(|i| 500 + offset + ((i % self.width) / 8 + (i / self.width) / 8) as u16 % 2 * 300)
            .collect();
        Ok(RawImageData {
            width: self.width,
            height: self.height,
            data: pixels,
            bits_per_sample: 12,
            metadata: FrameMetadata {
                black_levels: Some([64; 4]),
                white_level: Some(4095),
                ..FrameMetadata::default()
            },
        })
    }
}

struct MockWriter {
    should_fail: bool,
    written: Arc<Mutex<Vec<RawImageData>>>,
}

impl TiffWriter for MockWriter {
    fn write_tiff(&self, image: &RawImageData, _output: &mut dyn Write, _config: &TiffConfig) -> Result<()> {
        if self.should_fail {
            return Err(MergeError::EncodeError("Mock encode error".to_string()));
        }
        self.written.lock().unwrap().push(image.clone());
        Ok(())
    }
}

fn pipeline(
    reader: MockReader,
    writer_fails: bool,
    merge_config: MergeConfig,
) -> (BurstToTiffPipeline<MockReader, MockWriter>, Arc<Mutex<Vec<RawImageData>>>) {
    let written = Arc::new(Mutex::new(Vec::new()));
    let writer = MockWriter {
        should_fail: writer_fails,
        written: written.clone(),
    };
    let pipeline = BurstToTiffPipeline::with_custom(reader, writer, merge_config, TiffConfig::default())
        .unwrap()
        .with_decode_workers(2);
    (pipeline, written)
}

fn fast_config() -> MergeConfig {
    MergeConfig::builder()
        .algorithm(MergingAlgorithm::Fast)
        .threads(Some(2))
        .build()
}

#[test]
fn test_successful_merge() {
    let (pipeline, written) = pipeline(MockReader::new(), false, fast_config());
    let inputs: [&[u8]; 3] = [&[0], &[2], &[4]];

    let mut output = Cursor::new(Vec::new());
    let scale = pipeline.convert(&inputs, &mut output).unwrap();

    assert_eq!(scale, None);
    let written = written.lock().unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!((written[0].width, written[0].height), (WIDTH, HEIGHT));
    assert_eq!(written[0].data.len(), WIDTH * HEIGHT);
}

#[test]
fn test_sixteen_bit_output_reports_scale() {
    let config = MergeConfig::builder()
        .algorithm(MergingAlgorithm::Fast)
        .output_bit_depth(OutputBitDepth::SixteenBit)
        .build();
    let (pipeline, written) = pipeline(MockReader::new(), false, config);
    let inputs: [&[u8]; 2] = [&[0], &[1]];

    let scale = pipeline.convert(&inputs, &mut Cursor::new(Vec::new())).unwrap();

    assert!(scale.is_some());
    assert_eq!(written.lock().unwrap()[0].bits_per_sample, 16);
}

#[test]
fn test_reader_failure() {
    let reader = MockReader {
        should_fail: true,
        ..MockReader::new()
    };
    let (pipeline, written) = pipeline(reader, false, fast_config());
    let inputs: [&[u8]; 2] = [&[0], &[1]];

    let result = pipeline.convert(&inputs, &mut Cursor::new(Vec::new()));

    assert!(matches!(result, Err(MergeError::DecodeError(_))));
    assert!(written.lock().unwrap().is_empty());
}

#[test]
fn test_writer_failure() {
    let (pipeline, _) = pipeline(MockReader::new(), true, fast_config());
    let inputs: [&[u8]; 2] = [&[0], &[1]];

    let result = pipeline.convert(&inputs, &mut Cursor::new(Vec::new()));

    assert!(matches!(result, Err(MergeError::EncodeError(_))));
}

#[test]
fn test_zero_dimensions_rejected() {
    let reader = MockReader {
        width: 0,
        ..MockReader::new()
    };
    let (pipeline, _) = pipeline(reader, false, fast_config());
    let inputs: [&[u8]; 2] = [&[0], &[1]];

    let result = pipeline.convert(&inputs, &mut Cursor::new(Vec::new()));

    assert!(matches!(result, Err(MergeError::InvalidDimensions(0, HEIGHT))));
}

#[test]
fn test_truncated_frames_rejected() {
    let reader = MockReader {
        truncated: true,
        ..MockReader::new()
    };
    let (pipeline, written) = pipeline(reader, false, fast_config());
    let inputs: [&[u8]; 2] = [&[0], &[1]];

    let result = pipeline.convert(&inputs, &mut Cursor::new(Vec::new()));

    assert!(matches!(result, Err(MergeError::InvalidDimensions(WIDTH, HEIGHT))));
    assert!(written.lock().unwrap().is_empty());
}

#[test]
fn test_single_frame_rejected() {
    let (pipeline, _) = pipeline(MockReader::new(), false, fast_config());
    let inputs: [&[u8]; 1] = [&[0]];

    let result = pipeline.convert(&inputs, &mut Cursor::new(Vec::new()));

    assert!(matches!(result, Err(MergeError::InsufficientFrames(1))));
}

#[test]
fn test_invalid_merge_config_rejected() {
    let config = MergeConfig::builder().noise_reduction(0.0).build();
    let written = Arc::new(Mutex::new(Vec::new()));
    let writer = MockWriter {
        should_fail: false,
        written,
    };

    let result = BurstToTiffPipeline::with_custom(MockReader::new(), writer, config, TiffConfig::default());

    assert!(matches!(result, Err(MergeError::InvalidNoiseReduction(_))));
}

#[test]
fn test_convert_files() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..3u8)
        .map(|i| {
            let path = dir.path().join(format!("frame_{i}.raw"));
            std::fs::write(&path, [i]).unwrap();
            path
        })
        .collect();
    let output_path = dir.path().join("merged.tiff");
    let (pipeline, written) = pipeline(MockReader::new(), false, fast_config());

    pipeline.convert_files(&paths, &output_path).unwrap();

    assert!(output_path.exists());
    assert_eq!(written.lock().unwrap().len(), 1);
}

#[test]
fn test_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![dir.path().join("missing_a.raw"), dir.path().join("missing_b.raw")];
    let (pipeline, _) = pipeline(MockReader::new(), false, fast_config());

    let result = pipeline.convert_files(&paths, dir.path().join("out.tiff"));

    assert!(matches!(result, Err(MergeError::InputReadError(_))));
}
