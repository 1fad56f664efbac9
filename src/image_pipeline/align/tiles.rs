use std::ops::Add;

use crate::image_pipeline::common::{BufferFormat, BufferKey, ComputeContext, PooledBuffer};
use crate::image_pipeline::texture::ImageBuffer;

/// Displacement of one tile, in pixels of the level it was estimated on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TileOffset {
    pub dx: i32,
    pub dy: i32,
}

impl TileOffset {
    pub const ZERO: TileOffset = TileOffset { dx: 0, dy: 0 };

    pub const fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    pub const fn scaled(self, factor: i32) -> Self {
        Self::new(self.dx * factor, self.dy * factor)
    }
}

impl Add for TileOffset {
    type Output = TileOffset;

    fn add(self, rhs: TileOffset) -> TileOffset {
        TileOffset::new(self.dx + rhs.dx, self.dy + rhs.dy)
    }
}

/// One offset per tile.
pub type AlignmentField = ImageBuffer<TileOffset>;

/// Tile grid of one pyramid level. Tiles overlap by half their size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileInfo {
    pub tile_size: usize,
    pub search_dist: usize,
    pub n_tiles_x: usize,
    pub n_tiles_y: usize,
    pub n_pos_1d: usize,
    pub n_pos_2d: usize,
}

impl TileInfo {
    pub fn new(level_width: usize, level_height: usize, tile_size: usize, search_dist: usize) -> Self {
        let half = (tile_size / 2).max(1);
        let n_pos_1d = 2 * search_dist + 1;
        Self {
            tile_size,
            search_dist,
            n_tiles_x: (level_width / half).saturating_sub(1).max(1),
            n_tiles_y: (level_height / half).saturating_sub(1).max(1),
            n_pos_1d,
            n_pos_2d: n_pos_1d * n_pos_1d,
        }
    }

    pub fn tile_count(&self) -> usize {
        self.n_tiles_x * self.n_tiles_y
    }

    pub fn tile_origin(&self, tx: usize, ty: usize) -> (usize, usize) {
        let half = self.tile_size / 2;
        (tx * half, ty * half)
    }

    /// Candidate offset at flattened search position `pos`.
    pub fn position_offset(&self, pos: usize) -> TileOffset {
        let sd = self.search_dist as i32;
        TileOffset::new(
            (pos % self.n_pos_1d) as i32 - sd,
            (pos / self.n_pos_1d) as i32 - sd,
        )
    }

    /// Search position of the zero offset.
    pub fn center_position(&self) -> usize {
        self.search_dist * self.n_pos_1d + self.search_dist
    }
}

/// Matching cost of every candidate offset for every tile, tile-major.
pub struct TileDifferenceVolume<'a> {
    info: TileInfo,
    values: PooledBuffer<'a>,
}

impl<'a> TileDifferenceVolume<'a> {
    pub fn new(ctx: &'a ComputeContext, info: TileInfo) -> Self {
        let key = BufferKey::new(info.n_pos_2d, info.tile_count(), BufferFormat::TileDifferences);
        Self {
            info,
            values: ctx.buffers().acquire(key),
        }
    }

    pub fn info(&self) -> &TileInfo {
        &self.info
    }

    pub fn tile_costs(&self, tx: usize, ty: usize) -> &[f32] {
        let start = (ty * self.info.n_tiles_x + tx) * self.info.n_pos_2d;
        &self.values[start..start + self.info.n_pos_2d]
    }

    pub fn get(&self, tx: usize, ty: usize, pos: usize) -> f32 {
        self.tile_costs(tx, ty)[pos]
    }

    pub fn costs_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }
}
