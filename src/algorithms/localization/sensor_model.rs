//! Planar likelihood-field sensor model.
//!
//! Each beam endpoint is projected into the map and scored against the
//! precomputed obstacle-distance field, so a particle's scan likelihood
//! costs one field lookup per beam instead of a ray cast. Per-beam scores
//! are cubed before aggregation; the sharpening is deliberate and the
//! filter's weights are relative, so the distortion buys contrast between
//! close hypotheses.

use crate::algorithms::mapping::OccupancyMap;
use crate::core::types::{subsample_step, PlanarScan, Pose2D};

use super::particle_filter::Sample;

/// How cubed per-beam scores combine into a sample's weight factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BeamAggregation {
    /// Accumulate `1 + Σ pz³`; a bad beam cannot zero the sample.
    #[default]
    SumOfCubes,
    /// Accumulate `Π pz³`; sharper, but sensitive to outlier beams.
    ProductOfCubes,
}

/// Tunable parameters of the planar likelihood-field model.
#[derive(Debug, Clone, Copy)]
pub struct LaserModelParams {
    /// Mixture weight of the Gaussian hit component.
    pub z_hit: f64,
    /// Mixture weight of the uniform random-measurement component.
    pub z_rand: f64,
    /// Standard deviation of the hit Gaussian, meters.
    pub sigma_hit: f64,
    /// Beam budget per scan; beams are uniformly strided down to this.
    pub max_beams: usize,
    /// Aggregation of per-beam scores.
    pub aggregation: BeamAggregation,
}

impl Default for LaserModelParams {
    fn default() -> Self {
        Self {
            z_hit: 0.95,
            z_rand: 0.05,
            sigma_hit: 0.2,
            max_beams: 30,
            aggregation: BeamAggregation::SumOfCubes,
        }
    }
}

/// Map-dependent weight factors, swapped wholesale during global
/// localization.
#[derive(Debug, Clone, Copy)]
pub struct MapFactors {
    /// Multiplier for off-map beam endpoints and off-map particles.
    pub off_map_factor: f64,
    /// Multiplier floor for particles standing too close to obstacles.
    pub non_free_space_factor: f64,
    /// Obstacle-distance radius below which the factor ramps in, meters.
    pub non_free_space_radius: f64,
}

impl Default for MapFactors {
    fn default() -> Self {
        Self {
            off_map_factor: 1.0,
            non_free_space_factor: 1.0,
            non_free_space_radius: 0.0,
        }
    }
}

impl MapFactors {
    /// Weight multiplier for a particle at obstacle distance `d`.
    ///
    /// Ramps linearly from the configured floor at the obstacle up to 1 at
    /// the radius.
    fn particle_factor(&self, d: f64) -> f64 {
        if self.non_free_space_radius > 0.0 && d < self.non_free_space_radius {
            self.non_free_space_factor
                + (1.0 - self.non_free_space_factor) * d / self.non_free_space_radius
        } else {
            1.0
        }
    }
}

/// Likelihood-field scorer for planar scans.
#[derive(Debug, Clone)]
pub struct LikelihoodFieldModel {
    params: LaserModelParams,
    factors: MapFactors,
}

impl LikelihoodFieldModel {
    /// Model with the given parameters and neutral map factors.
    pub fn new(params: LaserModelParams) -> Self {
        Self {
            params,
            factors: MapFactors::default(),
        }
    }

    /// The static parameters.
    pub fn params(&self) -> &LaserModelParams {
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

    /// Score one pose against a scan; used for uniform-pose vetting.
    pub fn score_pose(&self, map: &OccupancyMap, scan: &PlanarScan, pose: &Pose2D) -> f64 {
        let mut single = [Sample {
            pose: *pose,
            weight: 1.0,
        }];
        self.apply_to_samples(map, scan, &mut single);
        single[0].weight
    }

    /// Multiply every sample's weight by its scan likelihood factor and
    /// return the new total weight.
    pub fn apply_to_samples(
        &self,
        map: &OccupancyMap,
        scan: &PlanarScan,
        samples: &mut [Sample],
    ) -> f64 {
        let step = subsample_step(scan.beams.len(), self.params.max_beams);
        let gauss_denom = 2.0 * self.params.sigma_hit * self.params.sigma_hit;
        let p_rand = if scan.range_max > 0.0 {
            self.params.z_rand / scan.range_max
        } else {
            0.0
        };

        let mut total = 0.0;
        for sample in samples.iter_mut() {
            let sensor_world = sample.pose.compose(&scan.sensor_pose);
            let mut p = 1.0;

            let mut beam_index = 0;
            while beam_index < scan.beams.len() {
                let beam = &scan.beams[beam_index];
                beam_index += step;

                let z = beam.range;
                if !z.is_finite() || z <= 0.0 {
                    continue;
                }
                // Max-range returns carry no endpoint evidence here.
                if z >= scan.range_max {
                    continue;
                }

                let angle = sensor_world.theta + beam.bearing;
                let hit_x = sensor_world.x + z * angle.cos();
                let hit_y = sensor_world.y + z * angle.sin();

                let (i, j) = map.world_to_map(hit_x, hit_y);
                let off_map = !map.is_valid(i, j);
                let d = if off_map {
                    map.max_occ_dist()
                } else {
                    map.occ_dist(i, j)
                };

                let mut pz = self.params.z_hit * (-(d * d) / gauss_denom).exp() + p_rand;
                if off_map {
                    pz *= self.factors.off_map_factor;
                }

                match self.params.aggregation {
                    BeamAggregation::SumOfCubes => p += pz * pz * pz,
                    BeamAggregation::ProductOfCubes => p *= pz * pz * pz,
                }
            }

            // Penalize hypotheses that are themselves off the map or inside
            // the obstacle margin.
            let (pi, pj) = map.world_to_map(sample.pose.x, sample.pose.y);
            if !map.is_valid(pi, pj) {
                p *= self.factors.off_map_factor;
            } else {
                p *= self.factors.particle_factor(map.occ_dist(pi, pj));
            }

            sample.weight *= p;
            total += sample.weight;
        }
        total
    }
}
