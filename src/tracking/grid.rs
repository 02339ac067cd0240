//! Per-frame selection grid.
//!
//! The image is partitioned into `grid_size`-pixel cells; each cell keeps
//! at most one candidate with its best score and distance, so every frame
//! works with a small, spread-out set of points.

use nalgebra::{Vector2, Vector3};

use crate::map::PointId;

/// What currently occupies a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Unknown,
    /// Cell won by a raw cloud point (map-growth candidate).
    PointCloud,
    /// Cell won by an existing map point (alignment candidate).
    Map,
}

/// Sentinel for "no distance recorded yet".
const INIT_DIST: f32 = 10_000.0;

/// Dense cell grid covering the image.
#[derive(Debug)]
pub struct Grid {
    pub cell_size: usize,
    pub n_width: usize,
    pub n_height: usize,
    /// Cell count (`n_width * n_height`).
    pub len: usize,

    pub status: Vec<CellStatus>,
    /// Best corner score seen per cell.
    pub score: Vec<f32>,
    /// Distance of the closest map point per cell.
    pub dist: Vec<f32>,
    /// Chosen map point for `Map` cells.
    pub map_point: Vec<Option<PointId>>,
    /// Chosen world position for `PointCloud` cells.
    pub cloud_point: Vec<Option<Vector3<f64>>>,
}

impl Grid {
    pub fn new(width: u32, height: u32, cell_size: usize) -> Self {
        let n_width = width as usize / cell_size;
        let n_height = height as usize / cell_size;
        let len = n_width * n_height;
        Self {
            cell_size,
            n_width,
            n_height,
            len,
            status: vec![CellStatus::Unknown; len],
            score: vec![0.0; len],
            dist: vec![INIT_DIST; len],
            map_point: vec![None; len],
            cloud_point: vec![None; len],
        }
    }

    /// Clear everything except the per-cell scores.
    ///
    /// Scores survive so that map growth competes against the scores the
    /// association pass recorded for existing map points.
    pub fn reset(&mut self) {
        self.status.fill(CellStatus::Unknown);
        self.dist.fill(INIT_DIST);
        self.map_point.fill(None);
        self.cloud_point.fill(None);
    }

    /// Clear the per-cell scores as well.
    pub fn reset_scores(&mut self) {
        self.score.fill(0.0);
    }

    /// Column-major cell index of a pixel.
    pub fn cell_index(&self, px: &Vector2<f64>) -> usize {
        let col = ((px.x as usize) / self.cell_size).min(self.n_width - 1);
        let row = ((px.y as usize) / self.cell_size).min(self.n_height - 1);
        col * self.n_height + row
    }
}
