//! Hierarchical tile alignment
//!
//! Each comparison frame is matched against the reference on a coarse-to-fine
//! pyramid. Every level refines the per-tile displacement found one level up,
//! and the finest field is used to warp the comparison onto the reference grid.

mod aligner;
mod pyramid;
mod schedule;
mod search;
mod tiles;
mod warp;

pub use aligner::TileAligner;
pub use pyramid::{Pyramid, PyramidParams};
pub use schedule::{AlignmentSchedule, padding_for};
pub use search::{
    DiffNorm, ExposureMode, compute_tile_differences, correct_upsampling_error,
    find_best_tile_alignment, upsample_alignment,
};
pub use tiles::{AlignmentField, TileDifferenceVolume, TileInfo, TileOffset};
pub use warp::warp_texture;
