//! Occupancy-grid map with a precomputed obstacle-distance field.
//!
//! The grid stores a ternary occupancy state per cell plus, after
//! [`OccupancyMap::update_cspace`] has run, the distance from every cell to
//! its nearest occupied cell. The distance field is what the likelihood-field
//! sensor models read, so scoring a beam endpoint is a single lookup.

use log::warn;

/// Occupancy state of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i8)]
pub enum OccState {
    /// Known free.
    Free = -1,
    /// Never observed.
    #[default]
    Unknown = 0,
    /// Known occupied.
    Occupied = 1,
}

/// An occupancy-grid message as delivered by the map source.
///
/// Cell bytes follow the wire convention: 0 and −1 are free, 100 is
/// occupied, anything else is unknown.
#[derive(Debug, Clone)]
pub struct OccupancyGridMsg {
    /// Grid width in cells.
    pub width: u32,
    /// Grid height in cells.
    pub height: u32,
    /// Meters per cell.
    pub resolution: f64,
    /// World coordinates of the grid origin.
    pub origin_x: f64,
    /// World coordinates of the grid origin.
    pub origin_y: f64,
    /// Row-major cell bytes.
    pub data: Vec<i8>,
}

/// 2D occupancy map in world coordinates.
///
/// Indices are signed so off-grid arithmetic stays well-defined; validity
/// is checked through [`OccupancyMap::is_valid`].
#[derive(Debug, Clone)]
pub struct OccupancyMap {
    /// World X of the map center cell.
    origin_x: f64,
    /// World Y of the map center cell.
    origin_y: f64,
    /// Meters per cell.
    scale: f64,
    /// Width in cells.
    size_x: i32,
    /// Height in cells.
    size_y: i32,
    /// Row-major occupancy states.
    cells: Vec<OccState>,
    /// Row-major distance to the nearest occupied cell, meters.
    distances: Vec<f32>,
    /// Cap on the distance field.
    max_occ_dist: f64,
}

impl OccupancyMap {
    /// Create an empty map of the given size; all cells unknown.
    pub fn new(size_x: i32, size_y: i32, scale: f64, origin_x: f64, origin_y: f64) -> Self {
        let len = (size_x.max(0) as usize) * (size_y.max(0) as usize);
        Self {
            origin_x,
            origin_y,
            scale,
            size_x,
            size_y,
            cells: vec![OccState::Unknown; len],
            distances: Vec::new(),
            max_occ_dist: 0.0,
        }
    }

    /// Convert a grid message into the internal representation.
    ///
    /// The message origin names the corner of cell (0, 0); internally the
    /// origin is the map center, matching the coordinate conversions.
    pub fn from_msg(msg: &OccupancyGridMsg) -> Self {
        let size_x = msg.width as i32;
        let size_y = msg.height as i32;
        let origin_x = msg.origin_x + (size_x / 2) as f64 * msg.resolution;
        let origin_y = msg.origin_y + (size_y / 2) as f64 * msg.resolution;
        let mut map = Self::new(size_x, size_y, msg.resolution, origin_x, origin_y);
        if msg.data.len() != map.cells.len() {
            warn!(
                "occupancy grid data length {} does not match {}x{}",
                msg.data.len(),
                size_x,
                size_y
            );
        }
        for (cell, &byte) in map.cells.iter_mut().zip(msg.data.iter()) {
            *cell = match byte {
                0 | -1 => OccState::Free,
                100 => OccState::Occupied,
                _ => OccState::Unknown,
            };
        }
        map
    }

    /// Width in cells.
    #[inline]
    pub fn size_x(&self) -> i32 {
        self.size_x
    }

    /// Height in cells.
    #[inline]
    pub fn size_y(&self) -> i32 {
        self.size_y
    }

    /// Meters per cell.
    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// World coordinates of the map center cell.
    #[inline]
    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    /// Distance cap of the likelihood field, meters.
    #[inline]
    pub fn max_occ_dist(&self) -> f64 {
        self.max_occ_dist
    }

    /// Whether the given indices lie inside the grid.
    #[inline]
    pub fn is_valid(&self, i: i32, j: i32) -> bool {
        i >= 0 && i < self.size_x && j >= 0 && j < self.size_y
    }

    /// Row-major index for valid coordinates.
    #[inline]
    pub fn index(&self, i: i32, j: i32) -> usize {
        (j as usize) * (self.size_x as usize) + (i as usize)
    }

    /// World → map index conversion.
    #[inline]
    pub fn world_to_map(&self, wx: f64, wy: f64) -> (i32, i32) {
        let i = ((wx - self.origin_x) / self.scale + 0.5).floor() as i32 + self.size_x / 2;
        let j = ((wy - self.origin_y) / self.scale + 0.5).floor() as i32 + self.size_y / 2;
        (i, j)
    }

    /// Map index → world conversion (cell center).
    #[inline]
    pub fn map_to_world(&self, i: i32, j: i32) -> (f64, f64) {
        (
            self.origin_x + (i - self.size_x / 2) as f64 * self.scale,
            self.origin_y + (j - self.size_y / 2) as f64 * self.scale,
        )
    }

    /// Occupancy state at the given indices; unknown off-grid.
    #[inline]
    pub fn occ_state(&self, i: i32, j: i32) -> OccState {
        if self.is_valid(i, j) {
            self.cells[self.index(i, j)]
        } else {
            OccState::Unknown
        }
    }

    /// Mark a cell's occupancy state. Off-grid writes are ignored.
    pub fn set_occ_state(&mut self, i: i32, j: i32, state: OccState) {
        if self.is_valid(i, j) {
            let idx = self.index(i, j);
            self.cells[idx] = state;
        }
    }

    /// Distance to the nearest occupied cell, meters. Off-grid cells and
    /// maps without a computed field report the cap.
    #[inline]
    pub fn occ_dist(&self, i: i32, j: i32) -> f64 {
        if self.is_valid(i, j) && !self.distances.is_empty() {
            self.distances[self.index(i, j)] as f64
        } else {
            self.max_occ_dist
        }
    }

    /// Distance field lookup by world coordinates.
    #[inline]
    pub fn occ_dist_at_world(&self, wx: f64, wy: f64) -> f64 {
        let (i, j) = self.world_to_map(wx, wy);
        self.occ_dist(i, j)
    }

    /// Whether the distance field has been computed.
    #[inline]
    pub fn has_distance_field(&self) -> bool {
        !self.distances.is_empty()
    }

    /// Ordered free-cell indices for uniform pose generation.
    ///
    /// Only cells observed free qualify; sampling initial hypotheses out of
    /// unexplored space wastes particles.
    pub fn free_space_indices(&self) -> Vec<(i32, i32)> {
        let mut indices = Vec::new();
        for j in 0..self.size_y {
            for i in 0..self.size_x {
                if self.cells[self.index(i, j)] == OccState::Free {
                    indices.push((i, j));
                }
            }
        }
        indices
    }

    pub(crate) fn set_distance(&mut self, i: i32, j: i32, d: f64) {
        let idx = self.index(i, j);
        self.distances[idx] = d as f32;
    }

    pub(crate) fn reset_distances(&mut self, max_occ_dist: f64) {
        self.max_occ_dist = max_occ_dist;
        self.distances = vec![max_occ_dist as f32; self.cells.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_map() -> OccupancyMap {
        let msg = OccupancyGridMsg {
            width: 10,
            height: 10,
            resolution: 0.1,
            origin_x: 0.0,
            origin_y: 0.0,
            data: vec![0; 100],
        };
        OccupancyMap::from_msg(&msg)
    }

    #[test]
    fn test_from_msg_cell_states() {
        let mut data = vec![0i8; 100];
        data[0] = 100; // occupied
        data[1] = -1; // free on the wire
        data[2] = 50; // unknown
        let msg = OccupancyGridMsg {
            width: 10,
            height: 10,
            resolution: 0.1,
            origin_x: 0.0,
            origin_y: 0.0,
            data,
        };
        let map = OccupancyMap::from_msg(&msg);
        assert_eq!(map.occ_state(0, 0), OccState::Occupied);
        assert_eq!(map.occ_state(1, 0), OccState::Free);
        assert_eq!(map.occ_state(2, 0), OccState::Unknown);
    }

    #[test]
    fn test_world_map_roundtrip() {
        let map = square_map();
        for &(wx, wy) in &[(0.07, 0.07), (0.51, 0.22), (0.93, 0.88), (0.05, 0.85)] {
            let (i, j) = map.world_to_map(wx, wy);
            assert!(map.is_valid(i, j), "({wx}, {wy}) -> ({i}, {j})");
            let (bx, by) = map.map_to_world(i, j);
            assert!(
                (bx - wx).abs() <= 0.05 + 1e-12 && (by - wy).abs() <= 0.05 + 1e-12,
                "roundtrip drifted: ({wx}, {wy}) -> ({bx}, {by})"
            );
        }
    }

    #[test]
    fn test_validity_bounds() {
        let map = square_map();
        assert!(map.is_valid(0, 0));
        assert!(map.is_valid(9, 9));
        assert!(!map.is_valid(-1, 0));
        assert!(!map.is_valid(0, 10));
    }

    #[test]
    fn test_free_space_indices_skip_non_free() {
        let mut map = square_map();
        map.set_occ_state(3, 3, OccState::Occupied);
        map.set_occ_state(4, 4, OccState::Unknown);
        let free = map.free_space_indices();
        assert_eq!(free.len(), 98);
        assert!(!free.contains(&(3, 3)));
        assert!(!free.contains(&(4, 4)));
    }

    #[test]
    fn test_occ_dist_without_field_reports_cap() {
        let map = square_map();
        assert_eq!(map.occ_dist(5, 5), 0.0);
        assert!(!map.has_distance_field());
    }
}
