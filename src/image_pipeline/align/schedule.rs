use crate::image_pipeline::texture::Padding;

/// Search radius used at every pyramid level.
pub const LEVEL_SEARCH_DISTANCE: usize = 2;
/// Tile sizes stop halving here.
pub const MIN_TILE_SIZE: usize = 8;
/// Downscale between consecutive pyramid levels.
pub const LEVEL_DOWNSCALE: usize = 2;

/// Per-level alignment parameters, finest level first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentSchedule {
    downscale_factors: Vec<usize>,
    tile_sizes: Vec<usize>,
    search_distances: Vec<usize>,
}

impl AlignmentSchedule {
    /// Level 0 pools each mosaic super-pixel into one sample; further levels halve
    /// the resolution until it is at most `search_distance_threshold`.
    pub fn new(
        width: usize,
        height: usize,
        mosaic_pattern_width: usize,
        tile_size: usize,
        search_distance_threshold: usize,
    ) -> Self {
        let mosaic_pattern_width = mosaic_pattern_width.max(1);
        let mut downscale_factors = vec![mosaic_pattern_width];
        let mut tile_sizes = vec![tile_size];
        let mut search_distances = vec![LEVEL_SEARCH_DISTANCE];

        let mut resolution = width.min(height) / mosaic_pattern_width;
        while resolution > search_distance_threshold {
            let previous_tile = tile_sizes[tile_sizes.len() - 1];
            downscale_factors.push(LEVEL_DOWNSCALE);
            search_distances.push(LEVEL_SEARCH_DISTANCE);
            tile_sizes.push((previous_tile / 2).max(MIN_TILE_SIZE));
            resolution /= LEVEL_DOWNSCALE;
        }

        Self {
            downscale_factors,
            tile_sizes,
            search_distances,
        }
    }

    pub fn levels(&self) -> usize {
        self.downscale_factors.len()
    }

    pub fn downscale_factor(&self, level: usize) -> usize {
        self.downscale_factors[level]
    }

    pub fn tile_size(&self, level: usize) -> usize {
        self.tile_sizes[level]
    }

    pub fn search_distance(&self, level: usize) -> usize {
        self.search_distances[level]
    }

    /// Full-resolution pixels covered by one step at the coarsest level.
    pub fn total_downscale(&self) -> usize {
        self.downscale_factors.iter().product()
    }

    /// Frame dimensions are padded to a multiple of this so every level tiles evenly.
    pub fn tile_factor(&self) -> usize {
        self.tile_sizes[self.tile_sizes.len() - 1] * self.total_downscale()
    }

    /// Padding that brings a `width`x`height` frame plus `margin` up to the tile factor.
    pub fn padding(&self, width: usize, height: usize, margin: usize) -> Padding {
        let mosaic_pattern_width = self.downscale_factors[0];
        let (left, right) = padding_for(width, margin, self.tile_factor(), mosaic_pattern_width);
        let (top, bottom) = padding_for(height, margin, self.tile_factor(), mosaic_pattern_width);
        Padding::new(left, right, top, bottom)
    }
}

/// Splits the padding needed to round `len + margin` up to `tile_factor`.
///
/// The leading part is a multiple of the mosaic period so the colour filter
/// phase of every pixel survives padding.
pub fn padding_for(len: usize, margin: usize, tile_factor: usize, mosaic_pattern_width: usize) -> (usize, usize) {
    let needed = len + margin;
    let total = needed.div_ceil(tile_factor) * tile_factor - needed;
    let period = mosaic_pattern_width.max(1);
    let before = (total / 2) / period * period;
    (before, total - before)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_count_follows_search_threshold() {
        // 400 -> 200 -> 100 -> 50 super-pixels along the short side.
        let schedule = AlignmentSchedule::new(1000, 800, 2, 32, 64);
        assert_eq!(schedule.levels(), 4);
        assert_eq!(schedule.downscale_factor(0), 2);
        assert_eq!(schedule.downscale_factor(3), 2);
        assert_eq!(schedule.total_downscale(), 16);

        let coarse = AlignmentSchedule::new(1000, 800, 2, 32, 128);
        assert_eq!(coarse.levels(), 3);
    }

    #[test]
    fn test_small_frame_has_single_level() {
        let schedule = AlignmentSchedule::new(64, 64, 2, 16, 64);
        assert_eq!(schedule.levels(), 1);
        assert_eq!(schedule.tile_factor(), 32);
    }

    #[test]
    fn test_tile_sizes_halve_down_to_minimum() {
        let schedule = AlignmentSchedule::new(4096, 4096, 2, 32, 32);
        let sizes: Vec<_> = (0..schedule.levels()).map(|l| schedule.tile_size(l)).collect();
        assert_eq!(&sizes[..4], &[32, 16, 8, 8]);
        assert!((0..schedule.levels()).all(|l| schedule.search_distance(l) == 2));
    }

    #[test]
    fn test_padding_reaches_tile_factor_and_keeps_phase() {
        for (len, margin, factor, mw) in [(1000, 0, 64, 2), (1001, 8, 128, 2), (600, 0, 96, 6), (64, 0, 32, 2)] {
            let (before, after) = padding_for(len, margin, factor, mw);
            assert_eq!((len + margin + before + after) % factor, 0);
            assert_eq!(before % mw, 0);
        }
        assert_eq!(padding_for(64, 0, 32, 2), (0, 0));
    }

    #[test]
    fn test_schedule_padding() {
        let schedule = AlignmentSchedule::new(100, 60, 2, 16, 64);
        let padding = schedule.padding(100, 60, 8);
        let factor = schedule.tile_factor();
        assert_eq!((100 + 8 + padding.horizontal()) % factor, 0);
        assert_eq!((60 + 8 + padding.vertical()) % factor, 0);
    }
}
