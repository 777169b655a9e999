//! Bresenham ray casting over the occupancy grid.

use super::occupancy_map::{OccState, OccupancyMap};

impl OccupancyMap {
    /// Trace a ray from world position (`ox`, `oy`) along heading `oa` and
    /// return the world distance to the first occupied cell, or `max_range`
    /// if the ray leaves the grid or travels its full length unobstructed.
    pub fn calc_range(&self, ox: f64, oy: f64, oa: f64, max_range: f64) -> f64 {
        let (x0, y0) = self.world_to_map(ox, oy);
        let (x1, y1) = self.world_to_map(ox + max_range * oa.cos(), oy + max_range * oa.sin());

        // Iterate the driving axis; hit tests swap back when steep.
        let steep = (y1 - y0).abs() > (x1 - x0).abs();
        let (mut x0, mut y0, x1, y1) = if steep {
            (y0, x0, y1, x1)
        } else {
            (x0, y0, x1, y1)
        };

        let deltax = (x1 - x0).abs();
        let deltay = (y1 - y0).abs();
        let xstep = if x0 < x1 { 1 } else { -1 };
        let ystep = if y0 < y1 { 1 } else { -1 };

        let start_x = x0;
        let start_y = y0;
        let mut error = 0;
        let deltaerr = deltay;

        let hit = |x: i32, y: i32| -> bool {
            let (i, j) = if steep { (y, x) } else { (x, y) };
            self.is_valid(i, j) && self.occ_state(i, j) == OccState::Occupied
        };
        let dist = |x: i32, y: i32| -> f64 {
            let dx = (x - start_x) as f64;
            let dy = (y - start_y) as f64;
            (dx * dx + dy * dy).sqrt() * self.scale()
        };

        if hit(x0, y0) {
            return dist(x0, y0);
        }
        while x0 != x1 {
            x0 += xstep;
            error += deltaerr;
            if 2 * error >= deltax {
                y0 += ystep;
                error -= deltax;
            }
            if hit(x0, y0) {
                return dist(x0, y0);
            }
        }
        max_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    /// 40×40 free map at 0.05 m with a wall column at i = 30.
    fn walled_map() -> OccupancyMap {
        let mut map = OccupancyMap::new(40, 40, 0.05, 1.0, 1.0);
        for j in 0..40 {
            for i in 0..40 {
                map.set_occ_state(i, j, OccState::Free);
            }
        }
        for j in 0..40 {
            map.set_occ_state(30, j, OccState::Occupied);
        }
        map
    }

    #[test]
    fn test_ray_hits_wall() {
        let map = walled_map();
        // Origin at the map center; the wall is 10 cells in +x.
        let range = map.calc_range(1.0, 1.0, 0.0, 5.0);
        assert_relative_eq!(range, 0.5, epsilon = 0.051);
    }

    #[test]
    fn test_ray_misses_in_open_direction() {
        let map = walled_map();
        let range = map.calc_range(1.0, 1.0, PI, 0.8);
        assert_relative_eq!(range, 0.8);
    }

    #[test]
    fn test_ray_leaving_grid_returns_max_range() {
        let map = walled_map();
        let range = map.calc_range(1.0, 1.0, FRAC_PI_2, 10.0);
        assert_relative_eq!(range, 10.0);
    }

    #[test]
    fn test_diagonal_ray() {
        let mut map = walled_map();
        // Clear the wall and place a single diagonal obstacle.
        for j in 0..40 {
            map.set_occ_state(30, j, OccState::Free);
        }
        map.set_occ_state(25, 25, OccState::Occupied);
        let range = map.calc_range(1.0, 1.0, std::f64::consts::FRAC_PI_4, 5.0);
        let expected = (2.0f64).sqrt() * 0.25;
        assert_relative_eq!(range, expected, epsilon = 0.08);
    }
}
