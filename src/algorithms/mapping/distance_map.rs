//! Wavefront construction of the obstacle-distance field.
//!
//! Every occupied cell is seeded at distance zero into a min-heap; the
//! expansion pops the nearest frontier cell and relaxes its 4-neighbors,
//! carrying the originating occupied cell along so each neighbor's distance
//! is the true Euclidean distance to that source, read from a precomputed
//! table. Cells farther than the cap are left at the cap.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::occupancy_map::{OccState, OccupancyMap};

/// Precomputed `sqrt(di² + dj²)` table over the expansion radius.
#[derive(Debug)]
pub struct CachedDistanceMap {
    /// Cell-unit distances indexed by |di|, |dj|.
    distances: Vec<Vec<f64>>,
    /// Expansion radius in cells.
    cell_radius: i32,
}

impl CachedDistanceMap {
    /// Build the table for a grid resolution and world-distance cap.
    pub fn new(scale: f64, max_dist: f64) -> Self {
        let cell_radius = (max_dist / scale).ceil() as i32;
        let side = (cell_radius + 2) as usize;
        let mut distances = vec![vec![0.0; side]; side];
        for (i, row) in distances.iter_mut().enumerate() {
            for (j, d) in row.iter_mut().enumerate() {
                *d = ((i * i + j * j) as f64).sqrt();
            }
        }
        Self {
            distances,
            cell_radius,
        }
    }

    /// Expansion radius in cells.
    pub fn cell_radius(&self) -> i32 {
        self.cell_radius
    }

    /// Cell-unit distance for an offset already known to be within radius.
    #[inline]
    fn lookup(&self, di: i32, dj: i32) -> f64 {
        self.distances[di as usize][dj as usize]
    }
}

/// Frontier entry: a cell together with the occupied source it descends
/// from. Ordered by current distance, ties by insertion order.
#[derive(Debug, PartialEq)]
struct CellEntry {
    dist: f64,
    seq: u64,
    i: i32,
    j: i32,
    src_i: i32,
    src_j: i32,
}

impl Eq for CellEntry {}

impl Ord for CellEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for CellEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl OccupancyMap {
    /// Recompute the distance-to-nearest-occupied field, capped at
    /// `max_occ_dist` meters.
    pub fn update_cspace(&mut self, max_occ_dist: f64) {
        self.reset_distances(max_occ_dist);
        let cdm = CachedDistanceMap::new(self.scale(), max_occ_dist);

        let mut marked = vec![false; (self.size_x() as usize) * (self.size_y() as usize)];
        let mut heap: BinaryHeap<Reverse<CellEntry>> = BinaryHeap::new();
        let mut seq = 0u64;

        // Seed every occupied cell at distance zero.
        for j in 0..self.size_y() {
            for i in 0..self.size_x() {
                if self.occ_state(i, j) == OccState::Occupied {
                    let idx = self.index(i, j);
                    marked[idx] = true;
                    self.set_distance(i, j, 0.0);
                    heap.push(Reverse(CellEntry {
                        dist: 0.0,
                        seq,
                        i,
                        j,
                        src_i: i,
                        src_j: j,
                    }));
                    seq += 1;
                }
            }
        }

        while let Some(Reverse(current)) = heap.pop() {
            let neighbors = [
                (current.i - 1, current.j),
                (current.i + 1, current.j),
                (current.i, current.j - 1),
                (current.i, current.j + 1),
            ];
            for (ni, nj) in neighbors {
                if !self.is_valid(ni, nj) {
                    continue;
                }
                let idx = self.index(ni, nj);
                if marked[idx] {
                    continue;
                }
                let di = (ni - current.src_i).abs();
                let dj = (nj - current.src_j).abs();
                if di > cdm.cell_radius() || dj > cdm.cell_radius() {
                    continue;
                }
                let cell_dist = cdm.lookup(di, dj);
                let world_dist = cell_dist * self.scale();
                if world_dist > max_occ_dist {
                    continue;
                }
                marked[idx] = true;
                self.set_distance(ni, nj, world_dist);
                heap.push(Reverse(CellEntry {
                    dist: world_dist,
                    seq,
                    i: ni,
                    j: nj,
                    src_i: current.src_i,
                    src_j: current.src_j,
                }));
                seq += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn single_obstacle_map() -> OccupancyMap {
        let mut map = OccupancyMap::new(10, 10, 0.1, 0.0, 0.0);
        for j in 0..10 {
            for i in 0..10 {
                map.set_occ_state(i, j, OccState::Free);
            }
        }
        map.set_occ_state(5, 5, OccState::Occupied);
        map
    }

    #[test]
    fn test_single_obstacle_field() {
        let mut map = single_obstacle_map();
        map.update_cspace(0.5);

        assert_relative_eq!(map.occ_dist(5, 5), 0.0);
        assert_relative_eq!(map.occ_dist(4, 5), 0.1, epsilon = 1e-6);
        assert_relative_eq!(map.occ_dist(4, 4), 0.02f64.sqrt(), epsilon = 1e-6);
        // Beyond the cap the field saturates.
        assert_relative_eq!(map.occ_dist(0, 0), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_field_bounds_and_zero_iff_occupied() {
        let mut map = single_obstacle_map();
        map.set_occ_state(2, 7, OccState::Occupied);
        map.update_cspace(0.5);

        for j in 0..10 {
            for i in 0..10 {
                let d = map.occ_dist(i, j);
                assert!((0.0..=0.5).contains(&d), "dist[{i}][{j}] = {d}");
                if map.occ_state(i, j) == OccState::Occupied {
                    assert_eq!(d, 0.0);
                } else {
                    assert!(d > 0.0, "free cell ({i}, {j}) at zero distance");
                }
            }
        }
    }

    #[test]
    fn test_field_is_exact_euclidean_within_cap() {
        let mut map = single_obstacle_map();
        map.update_cspace(0.5);

        for j in 0..10 {
            for i in 0..10 {
                let exact =
                    (((i - 5) * (i - 5) + (j - 5) * (j - 5)) as f64).sqrt() * 0.1;
                let expected = exact.min(0.5);
                // Capped cells stay at the cap; reachable cells are exact.
                if exact <= 0.5 {
                    assert_relative_eq!(map.occ_dist(i, j), expected, epsilon = 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_two_obstacles_take_nearest() {
        let mut map = OccupancyMap::new(20, 5, 0.1, 0.0, 0.0);
        for j in 0..5 {
            for i in 0..20 {
                map.set_occ_state(i, j, OccState::Free);
            }
        }
        map.set_occ_state(0, 2, OccState::Occupied);
        map.set_occ_state(10, 2, OccState::Occupied);
        map.update_cspace(1.0);

        // Cell 4 is nearer the left obstacle, cell 7 nearer the right one.
        assert_relative_eq!(map.occ_dist(4, 2), 0.4, epsilon = 1e-6);
        assert_relative_eq!(map.occ_dist(7, 2), 0.3, epsilon = 1e-6);
    }
}
