//! Likelihood field projected from an octree-derived map.
//!
//! The octree itself lives outside the core; what arrives is a summary of
//! occupied leaf centers plus the lidar mounting height. Occupied voxels
//! within one resolution band of that height are rasterized into a planar
//! grid, and the same wavefront machinery used for occupancy maps produces
//! the distance field that point-cloud scoring reads.

use log::info;

use super::occupancy_map::{OccState, OccupancyMap};

/// Octree-derived map input: occupied leaf centers in world coordinates.
#[derive(Debug, Clone)]
pub struct OctreeSummary {
    /// Leaf edge length, meters.
    pub resolution: f64,
    /// Occupied leaf centers as (x, y, z).
    pub occupied: Vec<[f64; 3]>,
    /// Height of the lidar above the ground plane, meters.
    pub lidar_height: f64,
}

/// Planar likelihood field sliced out of an octree at lidar height.
#[derive(Debug, Clone)]
pub struct OctreeField {
    grid: OccupancyMap,
}

impl OctreeField {
    /// Rasterize the summary and precompute the distance field.
    ///
    /// The grid is padded by `max_occ_dist` on every side so endpoint
    /// lookups just outside the occupied extent still resolve.
    pub fn from_summary(summary: &OctreeSummary, max_occ_dist: f64) -> Self {
        let band: Vec<&[f64; 3]> = summary
            .occupied
            .iter()
            .filter(|p| (p[2] - summary.lidar_height).abs() <= summary.resolution)
            .collect();

        let scale = summary.resolution;
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &band {
            min_x = min_x.min(p[0]);
            max_x = max_x.max(p[0]);
            min_y = min_y.min(p[1]);
            max_y = max_y.max(p[1]);
        }
        if band.is_empty() {
            min_x = 0.0;
            max_x = 0.0;
            min_y = 0.0;
            max_y = 0.0;
        }

        let pad = max_occ_dist.max(scale);
        let size_x = (((max_x - min_x) + 2.0 * pad) / scale).ceil() as i32 + 1;
        let size_y = (((max_y - min_y) + 2.0 * pad) / scale).ceil() as i32 + 1;
        let center_x = (min_x + max_x) / 2.0;
        let center_y = (min_y + max_y) / 2.0;

        let mut grid = OccupancyMap::new(size_x, size_y, scale, center_x, center_y);
        for p in &band {
            let (i, j) = grid.world_to_map(p[0], p[1]);
            grid.set_occ_state(i, j, OccState::Occupied);
        }
        grid.update_cspace(max_occ_dist);

        info!(
            "octree field: {} of {} occupied leaves in the lidar band, grid {}x{} @ {} m",
            band.len(),
            summary.occupied.len(),
            size_x,
            size_y,
            scale
        );

        Self { grid }
    }

    /// The projected planar grid with its distance field.
    pub fn grid(&self) -> &OccupancyMap {
        &self.grid
    }

    /// Ordered valid-cell indices for uniform pose generation.
    ///
    /// An octree slice carries no explicit free-space observations, so any
    /// in-bounds, non-occupied cell qualifies.
    pub fn free_space_indices(&self) -> Vec<(i32, i32)> {
        let mut indices = Vec::new();
        for j in 0..self.grid.size_y() {
            for i in 0..self.grid.size_x() {
                if self.grid.occ_state(i, j) != OccState::Occupied {
                    indices.push((i, j));
                }
            }
        }
        indices
    }
}
