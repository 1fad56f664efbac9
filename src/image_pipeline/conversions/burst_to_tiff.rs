use std::io::Write;
use std::path::Path;

use tracing::{info, info_span, instrument};

use crate::image_pipeline::{
    common::{ComputeContext, MergeError, Result},
    merge::{BurstMerger, MergeConfig, MergedImage},
    raw::{RawImageData, RawImageReader, RawLoaderReader, load_burst, read_burst_files},
    tiff::{StandardTiffWriter, TiffConfig, TiffWriter},
};

#[cfg(test)]
mod tests;

/// Decode workers used when none are configured.
const DEFAULT_DECODE_WORKERS: usize = 4;

/// Decodes a burst of RAW files, merges it and writes the result as TIFF.
pub struct BurstToTiffPipeline<R: RawImageReader + Sync, W: TiffWriter> {
    reader: R,
    writer: W,
    merge_config: MergeConfig,
    tiff_config: TiffConfig,
    ctx: ComputeContext,
    decode_workers: usize,
}

impl BurstToTiffPipeline<RawLoaderReader, StandardTiffWriter> {
    pub fn new(merge_config: MergeConfig, tiff_config: TiffConfig) -> Result<Self> {
        Self::with_custom(RawLoaderReader, StandardTiffWriter, merge_config, tiff_config)
    }
}

impl<R: RawImageReader + Sync, W: TiffWriter> BurstToTiffPipeline<R, W> {
    pub fn with_custom(reader: R, writer: W, merge_config: MergeConfig, tiff_config: TiffConfig) -> Result<Self> {
        merge_config.validate()?;
        let ctx = ComputeContext::new(merge_config.threads)?;
        Ok(Self {
            reader,
            writer,
            merge_config,
            tiff_config,
            ctx,
            decode_workers: DEFAULT_DECODE_WORKERS,
        })
    }

    /// Caps how many frames are decoded at once.
    pub fn with_decode_workers(mut self, workers: usize) -> Self {
        self.decode_workers = workers.max(1);
        self
    }

    /// Merges already decoded frames. Frames whose sample count does not
    /// match their dimensions are rejected with `InvalidDimensions`.
    #[instrument(skip_all, fields(frames = frames.len()))]
    pub fn merge_frames(&self, frames: Vec<RawImageData>) -> Result<MergedImage> {
        let merger = BurstMerger::new(&self.ctx, self.merge_config.clone())?;
        merger.merge_raw(frames)
    }

    /// Returns the 16-bit scale factor when one was applied.
    #[instrument(skip_all, fields(frames = inputs.len()))]
    pub fn convert(&self, inputs: &[&[u8]], output: &mut dyn Write) -> Result<Option<f64>> {
        info!("Starting burst merge");

        let frames = {
            let _span = info_span!("decode_raw").entered();
            load_burst(&self.reader, inputs, self.decode_workers)?
        };

        self.merge_and_write(frames, output)
    }

    #[instrument(skip_all, fields(frames = input_paths.len()))]
    pub fn convert_files<P, Q>(&self, input_paths: &[P], output_path: Q) -> Result<Option<f64>>
    where
        P: AsRef<Path> + Sync,
        Q: AsRef<Path>,
    {
        let output_path = output_path.as_ref();
        info!(output = %output_path.display(), "Merging burst files");

        let frames = {
            let _span = info_span!("decode_raw").entered();
            read_burst_files(&self.reader, input_paths, self.decode_workers)?
        };

        let mut output_file = {
            let _span = info_span!("create_output_file").entered();
            std::fs::File::create(output_path)
                .map_err(|e| MergeError::OutputWriteError(format!("{}: {}", output_path.display(), e)))?
        };

        self.merge_and_write(frames, &mut output_file)
    }

    fn merge_and_write(&self, frames: Vec<RawImageData>, output: &mut dyn Write) -> Result<Option<f64>> {
        let merged = self.merge_frames(frames)?;

        {
            let _span = info_span!("encode_tiff").entered();
            self.writer.write_tiff(&merged.image, output, &self.tiff_config)?;
        }

        info!(
            width = merged.image.width,
            height = merged.image.height,
            bits_per_sample = merged.image.bits_per_sample,
            "Burst merge complete"
        );
        Ok(merged.scale_16bit)
    }

    pub fn merge_config(&self) -> &MergeConfig {
        &self.merge_config
    }

    pub fn tiff_config(&self) -> &TiffConfig {
        &self.tiff_config
    }
}
