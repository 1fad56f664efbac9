use std::f32::consts::PI;

use super::tiles::AlignmentField;
use crate::image_pipeline::texture::{ImageBuffer, Mosaic, clamp_same_phase};

/// Resamples `input` by the finest-level alignment field.
///
/// Vectors are in level-0 pixels and get multiplied by `downscale_factor`.
/// Bayer frames blend the up to 2x2 overlapping tiles covering a pixel with
/// raised-cosine weights; other mosaic periods take the nearest tile's vector.
/// Displaced coordinates are clamped without changing their mosaic phase.
pub fn warp_texture(
    input: &Mosaic,
    field: &AlignmentField,
    tile_size: usize,
    downscale_factor: usize,
    mosaic_pattern_width: usize,
) -> Mosaic {
    let half_tile = (tile_size / 2 * downscale_factor).max(1);
    if mosaic_pattern_width == 2 {
        warp_blended(input, field, half_tile, downscale_factor)
    } else {
        warp_nearest_tile(input, field, half_tile, downscale_factor, mosaic_pattern_width)
    }
}

/// Tiles covering `pos` along one axis with their window weights; weight 0 marks no tile.
fn covering_tiles(pos: usize, half_tile: usize, n_tiles: usize) -> [(usize, f32); 2] {
    let k = pos / half_tile;
    let window = |tile: usize| {
        let t = ((pos - tile * half_tile) as f32 + 0.5) / (2 * half_tile) as f32;
        0.5 - 0.5 * (2.0 * PI * t).cos()
    };

    let first = k.checked_sub(1).filter(|&t| t < n_tiles);
    let second = Some(k).filter(|&t| t < n_tiles);
    match (first, second) {
        (None, None) => [(n_tiles - 1, 1.0), (0, 0.0)],
        (first, second) => [
            first.map_or((0, 0.0), |t| (t, window(t))),
            second.map_or((0, 0.0), |t| (t, window(t))),
        ],
    }
}

fn warp_blended(input: &Mosaic, field: &AlignmentField, half_tile: usize, downscale_factor: usize) -> Mosaic {
    let (width, height) = input.dimensions();
    let (n_tiles_x, n_tiles_y) = field.dimensions();
    let scale = downscale_factor as isize;

    ImageBuffer::from_fn(width, height, |x, y| {
        let columns = covering_tiles(x, half_tile, n_tiles_x);
        let rows = covering_tiles(y, half_tile, n_tiles_y);

        let mut total = 0.0;
        let mut total_weight = 0.0;
        for &(ty, wy) in &rows {
            if wy <= 0.0 {
                continue;
            }
            for &(tx, wx) in &columns {
                if wx <= 0.0 {
                    continue;
                }
                let offset = field[(tx, ty)];
                let sx = clamp_same_phase(x as isize + offset.dx as isize * scale, width, 2);
                let sy = clamp_same_phase(y as isize + offset.dy as isize * scale, height, 2);
                let weight = wx * wy;
                total += weight * input[(sx, sy)];
                total_weight += weight;
            }
        }

        if total_weight > 0.0 {
            total / total_weight
        } else {
            input[(x, y)]
        }
    })
}

fn warp_nearest_tile(
    input: &Mosaic,
    field: &AlignmentField,
    half_tile: usize,
    downscale_factor: usize,
    mosaic_pattern_width: usize,
) -> Mosaic {
    let (width, height) = input.dimensions();
    let (n_tiles_x, n_tiles_y) = field.dimensions();
    let scale = downscale_factor as isize;
    let nearest = |pos: usize, n_tiles: usize| ((pos + half_tile / 2) / half_tile).saturating_sub(1).min(n_tiles - 1);

    ImageBuffer::from_fn(width, height, |x, y| {
        let offset = field[(nearest(x, n_tiles_x), nearest(y, n_tiles_y))];
        let sx = clamp_same_phase(x as isize + offset.dx as isize * scale, width, mosaic_pattern_width);
        let sy = clamp_same_phase(y as isize + offset.dy as isize * scale, height, mosaic_pattern_width);
        input[(sx, sy)]
    })
}
