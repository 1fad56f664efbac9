use rayon::prelude::*;

use super::tiles::{AlignmentField, TileDifferenceVolume, TileInfo, TileOffset};
use crate::image_pipeline::common::ComputeContext;
use crate::image_pipeline::texture::{ImageBuffer, Mosaic, upsample_nearest};

/// Search radius served by the windowed fast path.
const FAST_SEARCH_DIST: usize = 2;
const FAST_POSITIONS: usize = (2 * FAST_SEARCH_DIST + 1) * (2 * FAST_SEARCH_DIST + 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffNorm {
    L1,
    L2,
}

impl DiffNorm {
    #[inline]
    fn apply(self, d: f32) -> f32 {
        match self {
            DiffNorm::L1 => d.abs(),
            DiffNorm::L2 => d * d,
        }
    }
}

/// Whether comparison tiles are brightness-matched to the reference before differencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    Uniform,
    Bracketed,
}

#[inline]
fn sample_clamped(image: &Mosaic, x: isize, y: isize) -> f32 {
    let cx = x.clamp(0, image.width() as isize - 1) as usize;
    let cy = y.clamp(0, image.height() as isize - 1) as usize;
    image[(cx, cy)]
}

#[inline]
fn brightness_ratio(reference_sum: f32, comparison_sum: f32) -> f32 {
    if reference_sum > f32::EPSILON && comparison_sum > f32::EPSILON {
        reference_sum / comparison_sum
    } else {
        1.0
    }
}

/// Cost of matching the reference tile at `(x0, y0)` against the comparison shifted by `offset`.
fn tile_cost(
    reference: &Mosaic,
    comparison: &Mosaic,
    (x0, y0): (usize, usize),
    tile_size: usize,
    offset: TileOffset,
    norm: DiffNorm,
    exposure: ExposureMode,
) -> f32 {
    let (x0, y0) = (x0 as isize, y0 as isize);
    let (ox, oy) = (offset.dx as isize, offset.dy as isize);
    let t = tile_size as isize;

    let ratio = match exposure {
        ExposureMode::Uniform => 1.0,
        ExposureMode::Bracketed => {
            let (mut reference_sum, mut comparison_sum) = (0.0, 0.0);
            for dy in 0..t {
                for dx in 0..t {
                    reference_sum += sample_clamped(reference, x0 + dx, y0 + dy);
                    comparison_sum += sample_clamped(comparison, x0 + dx + ox, y0 + dy + oy);
                }
            }
            brightness_ratio(reference_sum, comparison_sum)
        }
    };

    let mut cost = 0.0;
    for dy in 0..t {
        for dx in 0..t {
            let r = sample_clamped(reference, x0 + dx, y0 + dy);
            let c = sample_clamped(comparison, x0 + dx + ox, y0 + dy + oy);
            cost += norm.apply(r - ratio * c);
        }
    }
    cost
}

/// 5x5 search around `base`: the comparison window is gathered once and every
/// candidate is scored by sliding over it.
#[allow(clippy::too_many_arguments)]
fn tile_costs_windowed(
    reference: &Mosaic,
    comparison: &Mosaic,
    (x0, y0): (usize, usize),
    tile_size: usize,
    base: TileOffset,
    norm: DiffNorm,
    exposure: ExposureMode,
    costs: &mut [f32],
) {
    let t = tile_size;
    let span = t + 2 * FAST_SEARCH_DIST;
    let (x0, y0) = (x0 as isize, y0 as isize);
    let reach = FAST_SEARCH_DIST as isize;

    let mut ref_tile = Vec::with_capacity(t * t);
    for dy in 0..t as isize {
        for dx in 0..t as isize {
            ref_tile.push(sample_clamped(reference, x0 + dx, y0 + dy));
        }
    }

    let mut window = Vec::with_capacity(span * span);
    for wy in 0..span as isize {
        for wx in 0..span as isize {
            window.push(sample_clamped(
                comparison,
                x0 + base.dx as isize + wx - reach,
                y0 + base.dy as isize + wy - reach,
            ));
        }
    }

    let reference_sum: f32 = ref_tile.iter().sum();
    let n_pos_1d = 2 * FAST_SEARCH_DIST + 1;

    for (pos, cost) in costs.iter_mut().enumerate() {
        let (ox, oy) = (pos % n_pos_1d, pos / n_pos_1d);
        let ratio = match exposure {
            ExposureMode::Uniform => 1.0,
            ExposureMode::Bracketed => {
                let comparison_sum: f32 = (0..t)
                    .map(|ty| window[(oy + ty) * span + ox..][..t].iter().sum::<f32>())
                    .sum();
                brightness_ratio(reference_sum, comparison_sum)
            }
        };

        let mut total = 0.0;
        for ty in 0..t {
            let window_row = &window[(oy + ty) * span + ox..][..t];
            let ref_row = &ref_tile[ty * t..][..t];
            for (&r, &c) in ref_row.iter().zip(window_row) {
                total += norm.apply(r - ratio * c);
            }
        }
        *cost = total;
    }
}

/// Scores every candidate offset around each tile's predicted displacement.
pub fn compute_tile_differences<'a>(
    ctx: &'a ComputeContext,
    reference: &Mosaic,
    comparison: &Mosaic,
    prediction: &AlignmentField,
    info: TileInfo,
    norm: DiffNorm,
    exposure: ExposureMode,
) -> TileDifferenceVolume<'a> {
    let windowed = info.n_pos_2d == FAST_POSITIONS;
    fill_tile_differences(ctx, reference, comparison, prediction, info, norm, exposure, windowed)
}

#[allow(clippy::too_many_arguments)]
fn fill_tile_differences<'a>(
    ctx: &'a ComputeContext,
    reference: &Mosaic,
    comparison: &Mosaic,
    prediction: &AlignmentField,
    info: TileInfo,
    norm: DiffNorm,
    exposure: ExposureMode,
    windowed: bool,
) -> TileDifferenceVolume<'a> {
    let mut volume = TileDifferenceVolume::new(ctx, info);
    let n_tiles_x = info.n_tiles_x;

    volume
        .costs_mut()
        .par_chunks_mut(info.n_pos_2d)
        .enumerate()
        .for_each(|(tile, costs)| {
            let (tx, ty) = (tile % n_tiles_x, tile / n_tiles_x);
            let origin = info.tile_origin(tx, ty);
            let base = prediction[(tx, ty)];

            if windowed {
                tile_costs_windowed(reference, comparison, origin, info.tile_size, base, norm, exposure, costs);
            } else {
                for (pos, cost) in costs.iter_mut().enumerate() {
                    let offset = base + info.position_offset(pos);
                    *cost = tile_cost(reference, comparison, origin, info.tile_size, offset, norm, exposure);
                }
            }
        });

    volume
}

/// Picks the cheapest candidate per tile. Ties keep the zero offset, then the lowest position.
pub fn find_best_tile_alignment(volume: &TileDifferenceVolume<'_>, prediction: &AlignmentField) -> AlignmentField {
    let info = *volume.info();
    let center = info.center_position();

    ImageBuffer::from_fn(info.n_tiles_x, info.n_tiles_y, |tx, ty| {
        let costs = volume.tile_costs(tx, ty);
        let mut best = center;
        for (pos, &cost) in costs.iter().enumerate() {
            if cost < costs[best] {
                best = pos;
            }
        }
        prediction[(tx, ty)] + info.position_offset(best)
    })
}

/// Re-evaluates each predicted vector against its horizontal and vertical
/// neighbours' predictions and keeps the cheapest.
///
/// Even tiles look left/up and odd tiles right/down, clamped at the grid edge.
/// Ties keep the tile's own prediction, then the horizontal neighbour.
pub fn correct_upsampling_error(
    reference: &Mosaic,
    comparison: &Mosaic,
    prediction: &AlignmentField,
    info: &TileInfo,
    norm: DiffNorm,
    exposure: ExposureMode,
) -> AlignmentField {
    let (n_tiles_x, n_tiles_y) = prediction.dimensions();

    ImageBuffer::from_fn(n_tiles_x, n_tiles_y, |tx, ty| {
        let neighbour_x = if tx % 2 == 0 {
            tx.saturating_sub(1)
        } else {
            (tx + 1).min(n_tiles_x - 1)
        };
        let neighbour_y = if ty % 2 == 0 {
            ty.saturating_sub(1)
        } else {
            (ty + 1).min(n_tiles_y - 1)
        };

        let origin = info.tile_origin(tx, ty);
        let own = prediction[(tx, ty)];
        let mut best = own;
        let mut best_cost = tile_cost(reference, comparison, origin, info.tile_size, own, norm, exposure);

        for candidate in [prediction[(neighbour_x, ty)], prediction[(tx, neighbour_y)]] {
            if candidate == best {
                continue;
            }
            let cost = tile_cost(reference, comparison, origin, info.tile_size, candidate, norm, exposure);
            if cost < best_cost {
                best = candidate;
                best_cost = cost;
            }
        }
        best
    })
}

/// Carries a coarse field onto a finer tile grid, scaling vectors by the level downscale.
pub fn upsample_alignment(previous: &AlignmentField, n_tiles_x: usize, n_tiles_y: usize, factor: i32) -> AlignmentField {
    upsample_nearest(previous, n_tiles_x, n_tiles_y).map(|offset| offset.scaled(factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn noise_texture(width: usize, height: usize, seed: u64) -> Mosaic {
        let mut rng = StdRng::seed_from_u64(seed);
        let pixels = (0..width * height).map(|_| rng.random_range(0.0..1000.0)).collect();
        ImageBuffer::new(width, height, pixels)
    }

    fn shifted(image: &Mosaic, sx: isize, sy: isize) -> Mosaic {
        ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            sample_clamped(image, x as isize - sx, y as isize - sy)
        })
    }

    #[test]
    fn test_identical_levels_choose_zero_offset() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let level = noise_texture(64, 64, 1);
        let info = TileInfo::new(64, 64, 16, 2);
        let prediction = AlignmentField::filled(info.n_tiles_x, info.n_tiles_y, TileOffset::ZERO);

        let volume = compute_tile_differences(&ctx, &level, &level, &prediction, info, DiffNorm::L1, ExposureMode::Uniform);
        let field = find_best_tile_alignment(&volume, &prediction);

        assert!(field.pixels().iter().all(|&o| o == TileOffset::ZERO));
    }

    #[test]
    fn test_flat_levels_tie_break_to_zero() {
        let ctx = ComputeContext::new(Some(1)).unwrap();
        let flat = Mosaic::filled(32, 32, 7.0);
        let info = TileInfo::new(32, 32, 16, 2);
        let prediction = AlignmentField::filled(info.n_tiles_x, info.n_tiles_y, TileOffset::new(1, -1));

        let volume = compute_tile_differences(&ctx, &flat, &flat, &prediction, info, DiffNorm::L2, ExposureMode::Uniform);
        let field = find_best_tile_alignment(&volume, &prediction);

        assert!(field.pixels().iter().all(|&o| o == TileOffset::new(1, -1)));
    }

    #[test]
    fn test_finds_shift_within_search_radius() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let reference = noise_texture(64, 64, 2);
        let comparison = shifted(&reference, 2, -1);
        let info = TileInfo::new(64, 64, 16, 2);
        let prediction = AlignmentField::filled(info.n_tiles_x, info.n_tiles_y, TileOffset::ZERO);

        let volume = compute_tile_differences(&ctx, &reference, &comparison, &prediction, info, DiffNorm::L1, ExposureMode::Uniform);
        let field = find_best_tile_alignment(&volume, &prediction);

        assert_eq!(field[(3, 3)], TileOffset::new(2, -1));
    }

    #[test]
    fn test_windowed_path_matches_direct_costs() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let reference = noise_texture(48, 40, 3);
        let comparison = noise_texture(48, 40, 4);
        let info = TileInfo::new(48, 40, 16, 2);
        let prediction = ImageBuffer::from_fn(info.n_tiles_x, info.n_tiles_y, |x, y| {
            TileOffset::new(x as i32 % 3 - 1, 1 - y as i32 % 2)
        });

        for exposure in [ExposureMode::Uniform, ExposureMode::Bracketed] {
            let fast = fill_tile_differences(&ctx, &reference, &comparison, &prediction, info, DiffNorm::L2, exposure, true);
            let direct = fill_tile_differences(&ctx, &reference, &comparison, &prediction, info, DiffNorm::L2, exposure, false);

            for ty in 0..info.n_tiles_y {
                for tx in 0..info.n_tiles_x {
                    for (a, b) in fast.tile_costs(tx, ty).iter().zip(direct.tile_costs(tx, ty)) {
                        assert!((a - b).abs() <= 1e-3 * b.abs().max(1.0), "{a} vs {b}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_bracketed_mode_ignores_brightness_scale() {
        let ctx = ComputeContext::new(Some(2)).unwrap();
        let reference = noise_texture(64, 64, 5);
        let mut brighter = reference.clone();
        brighter.scale(2.0);
        let info = TileInfo::new(64, 64, 16, 2);
        let prediction = AlignmentField::filled(info.n_tiles_x, info.n_tiles_y, TileOffset::ZERO);

        let volume = compute_tile_differences(&ctx, &reference, &brighter, &prediction, info, DiffNorm::L2, ExposureMode::Bracketed);
        let field = find_best_tile_alignment(&volume, &prediction);

        assert!(field.pixels().iter().all(|&o| o == TileOffset::ZERO));
        assert!(volume.get(2, 2, info.center_position()) < 1.0);
    }

    #[test]
    fn test_upsampling_error_correction_prefers_better_neighbour() {
        let reference = noise_texture(64, 64, 6);
        let comparison = shifted(&reference, 3, 0);
        let info = TileInfo::new(64, 64, 16, 2);

        // Tile (2, 2) inherited a wrong vector; its left neighbour carries the right one.
        let mut prediction = AlignmentField::filled(info.n_tiles_x, info.n_tiles_y, TileOffset::new(3, 0));
        prediction[(2, 2)] = TileOffset::new(-1, 1);

        let corrected = correct_upsampling_error(&reference, &comparison, &prediction, &info, DiffNorm::L1, ExposureMode::Uniform);
        assert_eq!(corrected[(2, 2)], TileOffset::new(3, 0));
        assert_eq!(corrected[(4, 4)], TileOffset::new(3, 0));
    }

    #[test]
    fn test_upsampling_error_correction_keeps_prediction_on_ties() {
        let flat = Mosaic::filled(64, 64, 3.0);
        let info = TileInfo::new(64, 64, 16, 2);
        let prediction = ImageBuffer::from_fn(info.n_tiles_x, info.n_tiles_y, |x, y| {
            TileOffset::new(x as i32, y as i32)
        });

        let corrected = correct_upsampling_error(&flat, &flat, &prediction, &info, DiffNorm::L2, ExposureMode::Uniform);
        assert_eq!(corrected, prediction);
    }

    #[test]
    fn test_upsample_alignment_scales_vectors() {
        let coarse = ImageBuffer::new(2, 1, vec![TileOffset::new(1, 0), TileOffset::new(-1, 2)]);
        let fine = upsample_alignment(&coarse, 4, 2, 2);

        assert_eq!(fine.dimensions(), (4, 2));
        assert_eq!(fine[(1, 1)], TileOffset::new(2, 0));
        assert_eq!(fine[(3, 0)], TileOffset::new(-2, 4));
    }
}
