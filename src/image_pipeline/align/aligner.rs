use tracing::trace;

use super::pyramid::{Pyramid, PyramidParams};
use super::schedule::AlignmentSchedule;
use super::search::{
    DiffNorm, ExposureMode, compute_tile_differences, correct_upsampling_error,
    find_best_tile_alignment, upsample_alignment,
};
use super::tiles::{AlignmentField, TileInfo, TileOffset};
use super::warp::warp_texture;
use crate::image_pipeline::common::ComputeContext;
use crate::image_pipeline::texture::Mosaic;

/// Coarse-to-fine aligner for one reference pyramid.
pub struct TileAligner<'a> {
    ctx: &'a ComputeContext,
    schedule: &'a AlignmentSchedule,
}

impl<'a> TileAligner<'a> {
    pub fn new(ctx: &'a ComputeContext, schedule: &'a AlignmentSchedule) -> Self {
        Self { ctx, schedule }
    }

    /// Alignment field of every level, finest first.
    ///
    /// The coarsest level starts from a zero prediction. L2 costs are used on
    /// coarse levels and L1 on the finest one.
    pub fn estimate(&self, reference: &Pyramid, comparison: &Pyramid, exposure: ExposureMode) -> Vec<AlignmentField> {
        let levels = self.schedule.levels();
        debug_assert_eq!(reference.len(), levels);
        debug_assert_eq!(comparison.len(), levels);

        let mut fields = Vec::with_capacity(levels);
        let mut current = AlignmentField::filled(1, 1, TileOffset::ZERO);

        for level in (0..levels).rev() {
            let ref_level = reference.level(level);
            let comp_level = comparison.level(level);
            let info = TileInfo::new(
                ref_level.width(),
                ref_level.height(),
                self.schedule.tile_size(level),
                self.schedule.search_distance(level),
            );
            let factor = if level + 1 < levels {
                self.schedule.downscale_factor(level + 1) as i32
            } else {
                1
            };
            let norm = if level == 0 { DiffNorm::L1 } else { DiffNorm::L2 };

            let predicted = upsample_alignment(&current, info.n_tiles_x, info.n_tiles_y, factor);
            let corrected = correct_upsampling_error(ref_level, comp_level, &predicted, &info, norm, exposure);
            let volume = compute_tile_differences(self.ctx, ref_level, comp_level, &corrected, info, norm, exposure);
            current = find_best_tile_alignment(&volume, &corrected);

            trace!(level, tiles = info.tile_count(), "Level aligned");
            fields.push(current.clone());
        }

        fields.reverse();
        fields
    }

    /// Aligns `comparison` (same padded geometry as the reference) and warps it
    /// onto the reference grid.
    pub fn align(&self, reference: &Pyramid, comparison: &Mosaic, params: PyramidParams, exposure: ExposureMode) -> Mosaic {
        let comparison_pyramid = Pyramid::build(self.ctx, comparison, self.schedule, params);
        let fields = self.estimate(reference, &comparison_pyramid, exposure);

        warp_texture(
            comparison,
            &fields[0],
            self.schedule.tile_size(0),
            self.schedule.downscale_factor(0),
            params.mosaic_pattern_width,
        )
    }
}
