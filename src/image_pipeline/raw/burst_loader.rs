use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::image_pipeline::common::error::{MergeError, Result};
use crate::image_pipeline::raw::reader::RawImageReader;
use crate::image_pipeline::raw::types::RawImageData;

fn decode_pool(max_workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(max_workers.max(1))
        .thread_name(|i| format!("raw-decode-{i}"))
        .build()
        .map_err(|e| MergeError::ThreadPool(e.to_string()))
}

/// Decodes in-memory RAW files on at most `max_workers` threads.
///
/// Frames come back in input order; the first decode error is returned.
#[instrument(skip_all, fields(frames = inputs.len(), max_workers))]
pub fn load_burst<R>(reader: &R, inputs: &[&[u8]], max_workers: usize) -> Result<Vec<RawImageData>>
where
    R: RawImageReader + Sync,
{
    let pool = decode_pool(max_workers)?;
    pool.install(|| {
        inputs
            .par_iter()
            .enumerate()
            .map(|(index, data)| {
                debug!(index, bytes = data.len(), "Decoding frame");
                reader.read_raw(data)
            })
            .collect()
    })
}

/// Reads and decodes RAW files from disk on at most `max_workers` threads.
#[instrument(skip_all, fields(frames = paths.len(), max_workers))]
pub fn read_burst_files<R, P>(reader: &R, paths: &[P], max_workers: usize) -> Result<Vec<RawImageData>>
where
    R: RawImageReader + Sync,
    P: AsRef<Path> + Sync,
{
    let pool = decode_pool(max_workers)?;
    pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let path = path.as_ref();
                let data = std::fs::read(path)
                    .map_err(|e| MergeError::InputReadError(format!("{}: {}", path.display(), e)))?;
                debug!(path = %path.display(), bytes = data.len(), "Decoding frame");
                reader.read_raw(&data)
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::raw::types::FrameMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TaggingReader {
        calls: AtomicUsize,
    }

    impl RawImageReader for TaggingReader {
        fn read_raw(&self, data: &[u8]) -> Result<RawImageData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if data.is_empty() {
                return Err(MergeError::DecodeError("empty input".to_string()));
            }
            Ok(RawImageData {
                width: 1,
                height: 1,
                data: vec![u16::from(data[0])],
                bits_per_sample: 8,
                metadata: FrameMetadata::default(),
            })
        }
    }

    fn reader() -> TaggingReader {
        TaggingReader {
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_frames_keep_input_order() {
        let reader = reader();
        let payloads: Vec<Vec<u8>> = (0..12u8).map(|i| vec![i]).collect();
        let inputs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();

        let frames = load_burst(&reader, &inputs, 3).unwrap();

        let tags: Vec<u16> = frames.iter().map(|f| f.data[0]).collect();
        assert_eq!(tags, (0..12).collect::<Vec<_>>());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn test_decode_error_propagates() {
        let reader = reader();
        let inputs: [&[u8]; 3] = [&[1], &[], &[3]];

        let result = load_burst(&reader, &inputs, 2);
        assert!(matches!(result, Err(MergeError::DecodeError(_))));
    }

    #[test]
    fn test_missing_file_reports_read_error() {
        let reader = reader();
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.raw");
        std::fs::write(&present, [9u8]).unwrap();
        let missing = dir.path().join("missing.raw");

        let frames = read_burst_files(&reader, &[present.clone()], 1).unwrap();
        assert_eq!(frames[0].data, vec![9]);

        let result = read_burst_files(&reader, &[present, missing], 2);
        assert!(matches!(result, Err(MergeError::InputReadError(_))));
    }
}
