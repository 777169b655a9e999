//! Point-cloud sensor model over an octree-derived likelihood field.
//!
//! Endpoints are transformed through the particle pose and scored in the
//! planar field sliced at lidar height. The scoring mixture matches the
//! planar model; an extra penalty applies to endpoints that land beyond
//! the field cap, which on a height-sliced map usually means the return
//! came off something that never rasterized.

use crate::algorithms::mapping::OctreeField;
use crate::core::types::{subsample_step, PointCloudScan, Pose2D};

use super::particle_filter::Sample;
use super::sensor_model::MapFactors;

/// Tunable parameters of the point-cloud model.
#[derive(Debug, Clone, Copy)]
pub struct PointCloudModelParams {
    /// Mixture weight of the Gaussian hit component.
    pub z_hit: f64,
    /// Mixture weight of the uniform random-measurement component.
    pub z_rand: f64,
    /// Standard deviation of the hit Gaussian, meters.
    pub sigma_hit: f64,
    /// Nominal maximum sensor range, meters; normalizes the random term.
    pub max_range: f64,
    /// Point budget per cloud; clouds are uniformly strided down to this.
    pub max_beams: usize,
    /// Multiplier for endpoints scoring at the field cap.
    pub off_object_penalty_factor: f64,
}

impl Default for PointCloudModelParams {
    fn default() -> Self {
        Self {
            z_hit: 0.95,
            z_rand: 0.05,
            sigma_hit: 0.2,
            max_range: 20.0,
            max_beams: 256,
            off_object_penalty_factor: 1.0,
        }
    }
}

/// Likelihood scorer for 3D point clouds against the projected field.
#[derive(Debug, Clone)]
pub struct PointCloudModel {
    params: PointCloudModelParams,
    factors: MapFactors,
}

impl PointCloudModel {
    /// Model with the given parameters and neutral map factors.
    pub fn new(params: PointCloudModelParams) -> Self {
        Self {
            params,
            factors: MapFactors::default(),
        }
    }

    /// The static parameters.
    pub fn params(&self) -> &PointCloudModelParams {
        &self.params
    }

    /// Replace the map factors (normal vs. global-localization sets).
    pub fn set_map_factors(&mut self, factors: MapFactors) {
        self.factors = factors;
    }

    /// Current map factors.
    pub fn map_factors(&self) -> MapFactors {
        self.factors
    }

    /// Score one pose against a cloud; used for uniform-pose vetting.
    pub fn score_pose(&self, field: &OctreeField, scan: &PointCloudScan, pose: &Pose2D) -> f64 {
        let mut single = [Sample {
            pose: *pose,
            weight: 1.0,
        }];
        self.apply_to_samples(field, scan, &mut single);
        single[0].weight
    }

    /// Multiply every sample's weight by its cloud likelihood factor and
    /// return the new total weight.
    pub fn apply_to_samples(
        &self,
        field: &OctreeField,
        scan: &PointCloudScan,
        samples: &mut [Sample],
    ) -> f64 {
        let map = field.grid();
        let step = subsample_step(scan.points.len(), self.params.max_beams);
        let gauss_denom = 2.0 * self.params.sigma_hit * self.params.sigma_hit;
        let p_rand = if self.params.max_range > 0.0 {
            self.params.z_rand / self.params.max_range
        } else {
            0.0
        };
        let cap = map.max_occ_dist();

        let mut total = 0.0;
        for sample in samples.iter_mut() {
            let sensor_world = sample.pose.compose(&scan.sensor_pose);
            let (sin_t, cos_t) = sensor_world.theta.sin_cos();
            let mut p = 1.0;

            let mut index = 0;
            while index < scan.points.len() {
                let point = &scan.points[index];
                index += step;
                if !point[0].is_finite() || !point[1].is_finite() {
                    continue;
                }

                let hit_x = sensor_world.x + point[0] * cos_t - point[1] * sin_t;
                let hit_y = sensor_world.y + point[0] * sin_t + point[1] * cos_t;

                let (i, j) = map.world_to_map(hit_x, hit_y);
                let off_map = !map.is_valid(i, j);
                let d = if off_map { cap } else { map.occ_dist(i, j) };

                let mut pz = self.params.z_hit * (-(d * d) / gauss_denom).exp() + p_rand;
                if off_map {
                    pz *= self.factors.off_map_factor;
                } else if d >= cap {
                    pz *= self.params.off_object_penalty_factor;
                }
                p += pz * pz * pz;
            }

            let (pi, pj) = map.world_to_map(sample.pose.x, sample.pose.y);
            if !map.is_valid(pi, pj) {
                p *= self.factors.off_map_factor;
            } else if self.factors.non_free_space_radius > 0.0 {
                let d = map.occ_dist(pi, pj);
                if d < self.factors.non_free_space_radius {
                    p *= self.factors.non_free_space_factor
                        + (1.0 - self.factors.non_free_space_factor) * d
                            / self.factors.non_free_space_radius;
                }
            }

            sample.weight *= p;
            total += sample.weight;
        }
        total
    }
}
