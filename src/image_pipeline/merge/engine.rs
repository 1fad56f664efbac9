use tracing::{info, info_span, instrument, warn};

use super::burst::{BurstFrame, PreparedBurst};
use super::config::{MergeConfig, MergingAlgorithm};
use super::frequency::{FrequencyMerger, NoiseModel};
use super::spatial::SpatialMerger;
use super::temporal::average_frames;
use crate::image_pipeline::align::AlignmentSchedule;
use crate::image_pipeline::common::{ComputeContext, MergeError, Result};
use crate::image_pipeline::radiometry::{HotPixelMap, correct_exposure, equalize_exposure, pack_bit_depth};
use crate::image_pipeline::raw::types::{FrameMetadata, RawImageData};
use crate::image_pipeline::texture::Mosaic;

/// Merged burst in float form, before exposure correction and packing.
#[derive(Debug, Clone)]
pub struct MergedFrame {
    pub pixels: Mosaic,
    /// Metadata of the reference frame.
    pub metadata: FrameMetadata,
}

/// Final merge result ready for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedImage {
    pub image: RawImageData,
    /// Set when the output was stretched to 16 bits.
    pub scale_16bit: Option<f64>,
}

/// Runs one burst through validation, preprocessing, merging and finishing.
pub struct BurstMerger<'a> {
    ctx: &'a ComputeContext,
    config: MergeConfig,
}

impl<'a> BurstMerger<'a> {
    pub fn new(ctx: &'a ComputeContext, config: MergeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { ctx, config })
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Checks the burst shape before any pixel work happens.
    pub fn validate_burst(&self, frames: &[BurstFrame]) -> Result<()> {
        if frames.len() < 2 {
            return Err(MergeError::InsufficientFrames(frames.len()));
        }
        let reference_index = self.config.reference_index;
        if reference_index >= frames.len() {
            return Err(MergeError::InvalidReferenceIndex {
                index: reference_index,
                count: frames.len(),
            });
        }

        let first = &frames[0];
        let (width, height) = first.dimensions();
        if width == 0 || height == 0 {
            return Err(MergeError::InvalidDimensions(width, height));
        }
        let mosaic_pattern_width = first.metadata.mosaic_pattern_width;

        for (index, frame) in frames.iter().enumerate().skip(1) {
            let (actual_width, actual_height) = frame.dimensions();
            if (actual_width, actual_height) != (width, height) {
                return Err(MergeError::InconsistentResolution {
                    index,
                    expected_width: width,
                    expected_height: height,
                    actual_width,
                    actual_height,
                });
            }
            if frame.metadata.mosaic_pattern_width != mosaic_pattern_width {
                return Err(MergeError::InconsistentMosaicPattern {
                    index,
                    expected: mosaic_pattern_width,
                    actual: frame.metadata.mosaic_pattern_width,
                });
            }
        }

        let bias = first.metadata.exposure_bias;
        let uniform = frames.iter().all(|f| f.metadata.exposure_bias == bias);
        if !uniform && mosaic_pattern_width != 2 {
            return Err(MergeError::UnsupportedSensorExposureCombination(mosaic_pattern_width));
        }
        Ok(())
    }

    /// Merges the burst into one float frame on the reference's grid.
    #[instrument(skip_all, fields(frames = frames.len(), algorithm = %self.config.algorithm))]
    pub fn merge(&self, frames: Vec<BurstFrame>) -> Result<MergedFrame> {
        self.validate_burst(&frames)?;
        let burst = self.ctx.install(|| self.prepare(frames));

        let pixels = self.ctx.install(|| {
            if self.config.bypasses_alignment() {
                let _span = info_span!("temporal_average").entered();
                return average_frames(&burst);
            }

            let (width, height) = burst.reference().dimensions();
            let mosaic_pattern_width = burst.mosaic_pattern_width();
            let schedule = AlignmentSchedule::new(
                width,
                height,
                mosaic_pattern_width,
                self.config.tile_size.pixels(),
                self.config.search_distance.resolution_threshold(),
            );
            info!(levels = schedule.levels(), tile_factor = schedule.tile_factor(), "Alignment schedule");

            match self.config.algorithm {
                MergingAlgorithm::HigherQuality if mosaic_pattern_width == 2 => {
                    let _span = info_span!("frequency_merge").entered();
                    let noise = NoiseModel::new(self.config.noise_reduction, &burst);
                    FrequencyMerger::new(self.ctx, &schedule, noise).merge(&burst)
                }
                algorithm => {
                    if algorithm == MergingAlgorithm::HigherQuality {
                        warn!(
                            mosaic_pattern_width,
                            "Frequency merge needs a Bayer sensor, using the spatial merge"
                        );
                    }
                    let _span = info_span!("spatial_merge").entered();
                    SpatialMerger::new(self.ctx, &schedule, self.config.noise_reduction).merge(&burst)
                }
            }
        });

        Ok(MergedFrame {
            pixels,
            metadata: burst.reference().metadata.clone(),
        })
    }

    /// Applies exposure control and packs the merged frame into output integers.
    pub fn finalize(&self, merged: MergedFrame) -> MergedImage {
        let MergedFrame { pixels, mut metadata } = merged;
        let (width, height) = pixels.dimensions();
        let control = self.config.exposure_control;

        let corrected = {
            let _span = info_span!("exposure_correction", %control).entered();
            self.ctx
                .install(|| correct_exposure(self.ctx, pixels, control, &metadata))
        };
        let packed = pack_bit_depth(&corrected, self.config.output_bit_depth, control, &metadata);
        if let Some(scale) = packed.scale_16bit {
            metadata.white_level = Some(i32::from(u16::MAX));
            metadata.black_levels = metadata
                .black_levels
                .map(|levels| levels.map(|b| (f64::from(b) * scale).round() as i32));
        }

        MergedImage {
            image: RawImageData {
                width,
                height,
                data: packed.data,
                bits_per_sample: packed.bits_per_sample,
                metadata,
            },
            scale_16bit: packed.scale_16bit,
        }
    }

    /// Decoded frames in, finished image out.
    pub fn merge_raw(&self, raws: Vec<RawImageData>) -> Result<MergedImage> {
        for raw in &raws {
            if raw.width == 0 || raw.height == 0 || raw.data.len() != raw.width * raw.height {
                return Err(MergeError::InvalidDimensions(raw.width, raw.height));
            }
        }
        let frames = raws.iter().map(BurstFrame::from_raw).collect();
        let merged = self.merge(frames)?;
        Ok(self.finalize(merged))
    }

    fn prepare(&self, frames: Vec<BurstFrame>) -> PreparedBurst {
        let reference_index = self.config.reference_index;
        let mosaic_pattern_width = frames[reference_index].metadata.mosaic_pattern_width;
        let reference_bias = frames[reference_index].metadata.exposure_bias;

        let hot_pixels = {
            let _span = info_span!("hot_pixels").entered();
            let views: Vec<_> = frames.iter().map(|f| (&f.pixels, &f.metadata)).collect();
            HotPixelMap::detect(&views, mosaic_pattern_width)
        };
        if let Some(map) = &hot_pixels {
            info!(count = map.len(), "Hot pixels detected");
        }

        let _span = info_span!("equalize_exposure", reference_bias).entered();
        let frames = frames
            .into_iter()
            .map(|frame| {
                let pixels = match &hot_pixels {
                    Some(map) if !map.is_empty() => map.correct(&frame.pixels, mosaic_pattern_width),
                    _ => frame.pixels,
                };
                BurstFrame::new(
                    equalize_exposure(pixels, &frame.metadata, reference_bias),
                    frame.metadata,
                )
            })
            .collect();

        PreparedBurst::new(frames, reference_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::merge::{ExposureControl, OutputBitDepth, SearchDistance, TileSize};
    use crate::image_pipeline::texture::ImageBuffer;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn metadata() -> FrameMetadata {
        FrameMetadata {
            black_levels: Some([64; 4]),
            white_level: Some(4095),
            iso_exposure_time: 100.0,
            color_factors: Some([2.0, 1.0, 1.6]),
            ..FrameMetadata::default()
        }
    }

    fn scene(width: usize, height: usize) -> Mosaic {
        ImageBuffer::from_fn(width, height, |x, y| {
            let gradient = 600.0 + 4.0 * x as f32 + 2.0 * y as f32;
            let pattern = if (x / 16 + y / 16) % 2 == 0 { 300.0 } else { 0.0 };
            gradient + pattern
        })
    }

    fn noisy_burst(count: usize, sigma: f32, seed: u64) -> (Mosaic, Vec<BurstFrame>) {
        let clean = scene(128, 128);
        let mut rng = StdRng::seed_from_u64(seed);
        let frames = (0..count)
            .map(|_| {
                let pixels = clean
                    .pixels()
                    .iter()
                    .map(|&v| v + sigma * (rng.random::<f32>() - 0.5) * 2.0)
                    .collect();
                BurstFrame::new(ImageBuffer::new(128, 128, pixels), metadata())
            })
            .collect();
        (clean, frames)
    }

    fn mse(a: &Mosaic, b: &Mosaic) -> f32 {
        a.pixels()
            .iter()
            .zip(b.pixels())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            / a.len() as f32
    }

    #[test]
    fn test_static_burst_reduces_noise() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let config = MergeConfig::builder()
            .algorithm(MergingAlgorithm::Fast)
            .tile_size(TileSize::Medium)
            .search_distance(SearchDistance::Medium)
            .noise_reduction(13.0)
            .build();
        let merger = BurstMerger::new(&ctx, config).unwrap();
        let (clean, frames) = noisy_burst(5, 80.0, 1);
        let single_error = mse(&frames[0].pixels, &clean);

        let merged = merger.merge(frames).unwrap();

        assert_eq!(merged.pixels.dimensions(), (128, 128));
        assert!(mse(&merged.pixels, &clean) < single_error);
    }

    #[test]
    fn test_frequency_merge_reduces_noise() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let config = MergeConfig::builder()
            .algorithm(MergingAlgorithm::HigherQuality)
            .noise_reduction(13.0)
            .build();
        let merger = BurstMerger::new(&ctx, config).unwrap();
        let (clean, frames) = noisy_burst(4, 80.0, 2);
        let single_error = mse(&frames[0].pixels, &clean);

        let merged = merger.merge(frames).unwrap();

        assert_eq!(merged.pixels.dimensions(), (128, 128));
        assert!(mse(&merged.pixels, &clean) < single_error);
    }

    #[test]
    fn test_bracketed_burst_matches_reference() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let reference = scene(128, 128);
        // One stop darker above the black level of 64.
        let darker = reference.map(|&v| (v - 64.0) * 0.5 + 64.0);
        let underexposed = FrameMetadata {
            exposure_bias: -100,
            ..metadata()
        };
        let frames = vec![
            BurstFrame::new(reference.clone(), metadata()),
            BurstFrame::new(darker, underexposed),
        ];
        let config = MergeConfig::builder()
            .algorithm(MergingAlgorithm::HigherQuality)
            .build();
        let merger = BurstMerger::new(&ctx, config).unwrap();

        let merged = merger.merge(frames).unwrap();

        assert_eq!(merged.pixels.dimensions(), (128, 128));
        let max_error = merged
            .pixels
            .pixels()
            .iter()
            .zip(reference.pixels())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(max_error < 0.05, "max deviation {max_error}");
    }

    #[test]
    fn test_maximum_noise_reduction_is_plain_mean() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let (_, frames) = noisy_burst(3, 40.0, 3);
        let mut expected = Mosaic::new_default(128, 128);
        for frame in &frames {
            expected.add_scaled(&frame.pixels, 1.0 / 3.0);
        }

        for (tile_size, search_distance) in [
            (TileSize::Small, SearchDistance::Large),
            (TileSize::Large, SearchDistance::Small),
        ] {
            let config = MergeConfig::builder()
                .tile_size(tile_size)
                .search_distance(search_distance)
                .noise_reduction(23.0)
                .build();
            // Without black levels hot pixel repair is skipped, so the mean is exact.
            let frames: Vec<BurstFrame> = frames
                .iter()
                .map(|f| BurstFrame::new(f.pixels.clone(), FrameMetadata::default()))
                .collect();
            let merged = BurstMerger::new(&ctx, config).unwrap().merge(frames).unwrap();
            assert!(mse(&merged.pixels, &expected) < 1e-6);
        }
    }

    #[test]
    fn test_rejects_malformed_bursts() {
        let ctx = ComputeContext::new(Some(1)).unwrap();
        let merger = BurstMerger::new(&ctx, MergeConfig::default()).unwrap();
        let frame = |w, h, meta: FrameMetadata| BurstFrame::new(Mosaic::new_default(w, h), meta);

        let err = merger.merge(vec![frame(16, 16, metadata())]).unwrap_err();
        assert!(matches!(err, MergeError::InsufficientFrames(1)));

        let err = merger
            .merge(vec![frame(16, 16, metadata()), frame(16, 8, metadata())])
            .unwrap_err();
        assert!(matches!(err, MergeError::InconsistentResolution { index: 1, .. }));

        let xtrans = FrameMetadata {
            mosaic_pattern_width: 6,
            ..metadata()
        };
        let err = merger
            .merge(vec![frame(36, 36, xtrans.clone()), frame(36, 36, metadata())])
            .unwrap_err();
        assert!(matches!(err, MergeError::InconsistentMosaicPattern { index: 1, .. }));

        let bracketed = FrameMetadata {
            exposure_bias: -100,
            ..xtrans.clone()
        };
        let err = merger
            .merge(vec![frame(36, 36, xtrans), frame(36, 36, bracketed)])
            .unwrap_err();
        assert!(matches!(err, MergeError::UnsupportedSensorExposureCombination(6)));

        let config = MergeConfig::builder().reference_index(2).build();
        let err = BurstMerger::new(&ctx, config)
            .unwrap()
            .merge(vec![frame(16, 16, metadata()), frame(16, 16, metadata())])
            .unwrap_err();
        assert!(matches!(err, MergeError::InvalidReferenceIndex { index: 2, count: 2 }));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let ctx = ComputeContext::new(Some(1)).unwrap();
        let config = MergeConfig::builder().noise_reduction(30.0).build();
        assert!(matches!(
            BurstMerger::new(&ctx, config),
            Err(MergeError::InvalidNoiseReduction(_))
        ));
    }

    #[test]
    fn test_non_bayer_higher_quality_falls_back() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let xtrans = FrameMetadata {
            mosaic_pattern_width: 6,
            ..FrameMetadata::default()
        };
        let pixels = scene(96, 96);
        let frames = vec![
            BurstFrame::new(pixels.clone(), xtrans.clone()),
            BurstFrame::new(pixels.clone(), xtrans),
        ];
        let merger = BurstMerger::new(&ctx, MergeConfig::default()).unwrap();

        let merged = merger.merge(frames).unwrap();

        assert_eq!(merged.pixels.dimensions(), (96, 96));
        assert!(mse(&merged.pixels, &pixels) < 1e-3);
    }

    #[test]
    fn test_merge_raw_rejects_truncated_frames() {
        let ctx = ComputeContext::new(Some(1)).unwrap();
        let merger = BurstMerger::new(&ctx, MergeConfig::default()).unwrap();
        let raw = |len: usize| RawImageData {
            width: 16,
            height: 16,
            data: vec![100; len],
            bits_per_sample: 12,
            metadata: metadata(),
        };

        let err = merger.merge_raw(vec![raw(256), raw(10)]).unwrap_err();
        assert!(matches!(err, MergeError::InvalidDimensions(16, 16)));

        let empty = RawImageData {
            width: 0,
            data: Vec::new(),
            ..raw(0)
        };
        let err = merger.merge_raw(vec![empty, raw(256)]).unwrap_err();
        assert!(matches!(err, MergeError::InvalidDimensions(0, 16)));
    }

    #[test]
    fn test_merge_raw_packs_output() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let config = MergeConfig::builder()
            .algorithm(MergingAlgorithm::Fast)
            .exposure_control(ExposureControl::LinearFullRange)
            .output_bit_depth(OutputBitDepth::SixteenBit)
            .build();
        let merger = BurstMerger::new(&ctx, config).unwrap();
        let (_, frames) = noisy_burst(3, 20.0, 4);
        let raws: Vec<RawImageData> = frames
            .iter()
            .map(|f| RawImageData {
                width: 128,
                height: 128,
                data: f.pixels.to_u16(1.0),
                bits_per_sample: 12,
                metadata: f.metadata.clone(),
            })
            .collect();

        let merged = merger.merge_raw(raws).unwrap();

        assert_eq!((merged.image.width, merged.image.height), (128, 128));
        assert_eq!(merged.image.data.len(), 128 * 128);
        assert_eq!(merged.image.bits_per_sample, 16);
        assert_eq!(merged.image.metadata.white_level, Some(65535));
        let scale = merged.scale_16bit.unwrap();
        assert!((scale - 65535.0 / 4095.0).abs() < 1e-9);
        let black = (64.0 * scale).round() as i32;
        assert_eq!(merged.image.metadata.black_levels, Some([black; 4]));
        assert!(merged.image.data.iter().all(|&v| i32::from(v) >= black - 1));
    }
}
