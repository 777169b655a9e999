//! Runtime configuration for the localizer.
//!
//! Every field has a serde default so partial YAML files work; model-type
//! fields stay strings on the wire and are resolved to enums through the
//! lossy parsers, which warn and fall back instead of failing.

mod defaults;

use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::algorithms::localization::{
    BeamAggregation, LaserModelParams, MapFactors, OdomModelKind, PointCloudModelParams,
    ResampleModelKind,
};
use crate::core::types::{Covariance3, Pose2D};
use crate::error::Result;

/// Full localizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmclConfig {
    // Particle population.
    pub min_particles: usize,
    pub max_particles: usize,
    /// KLD population error bound ε.
    pub kld_err: f64,
    /// KLD upper quantile z_p.
    pub kld_z: f64,

    // Update cadence.
    /// Translation threshold triggering a filter update, meters.
    pub update_min_d: f64,
    /// Rotation threshold triggering a filter update, radians.
    pub update_min_a: f64,
    /// Resample every this many filter updates.
    pub resample_interval: u32,
    /// "multinomial" or "systematic".
    pub resample_model_type: String,

    // Odometry model.
    /// One of "diff", "omni", "diff-corrected", "omni-corrected", "gaussian".
    pub odom_model_type: String,
    pub odom_alpha1: f64,
    pub odom_alpha2: f64,
    pub odom_alpha3: f64,
    pub odom_alpha4: f64,
    pub odom_alpha5: f64,
    /// Enables the absolute-motion integrator; when on, the accumulated
    /// motion drives the update thresholds and the gaussian model.
    pub odom_integrator_enabled: bool,

    // Planar laser model.
    pub laser_max_beams: usize,
    pub laser_z_hit: f64,
    pub laser_z_short: f64,
    pub laser_z_max: f64,
    pub laser_z_rand: f64,
    pub laser_sigma_hit: f64,
    pub laser_likelihood_max_dist: f64,
    pub laser_off_map_factor: f64,
    pub laser_non_free_space_factor: f64,
    pub laser_non_free_space_radius: f64,

    // Point-cloud model.
    pub point_cloud_max_beams: usize,
    pub point_cloud_max_range: f64,
    pub point_cloud_z_hit: f64,
    pub point_cloud_z_rand: f64,
    pub point_cloud_sigma_hit: f64,
    /// Lidar mounting height used to slice the octree, meters.
    pub lidar_height: f64,
    pub off_object_penalty_factor: f64,

    // Recovery.
    pub recovery_alpha_slow: f64,
    pub recovery_alpha_fast: f64,
    pub global_localization_alpha_slow: f64,
    pub global_localization_alpha_fast: f64,
    pub global_localization_off_map_factor: f64,
    pub global_localization_non_free_space_factor: f64,

    // Uniform pose vetting.
    pub uniform_pose_starting_weight_threshold: f64,
    pub uniform_pose_deweight_multiplier: f64,

    // Convergence.
    /// Weighted-std threshold on x and y for the converged flag, meters.
    pub convergence_std_threshold: f64,

    // Transforms and publication.
    /// Forward-dating of the published map→odom transform, seconds.
    pub transform_tolerance: f64,
    /// Rate of the transform republisher, Hz.
    pub transform_publish_rate: f64,
    /// Publish odom→map instead of map→odom.
    pub tf_reverse: bool,
    /// Master switch for transform publication.
    pub tf_broadcast: bool,

    // Pose persistence.
    pub save_pose: bool,
    pub saved_pose_filename: String,
    /// Writes per second; 0 disables the periodic save.
    pub save_pose_to_file_rate: f64,

    // Maps.
    /// Ignore map messages after the first.
    pub first_map_only: bool,

    // Liveness.
    /// Warn when no scan arrives for this long, seconds.
    pub scan_check_interval: f64,

    // Frame identifiers (opaque to the core).
    pub base_frame_id: String,
    pub odom_frame_id: String,
    pub global_frame_id: String,
    pub global_alt_frame_id: String,

    // Startup pose used when no saved pose is available.
    pub initial_pose_x: f64,
    pub initial_pose_y: f64,
    pub initial_pose_a: f64,
    pub initial_cov_xx: f64,
    pub initial_cov_yy: f64,
    pub initial_cov_aa: f64,
}

impl Default for AmclConfig {
    fn default() -> Self {
        Self {
            min_particles: defaults::MIN_PARTICLES,
            max_particles: defaults::MAX_PARTICLES,
            kld_err: defaults::KLD_ERR,
            kld_z: defaults::KLD_Z,
            update_min_d: defaults::UPDATE_MIN_D,
            update_min_a: defaults::UPDATE_MIN_A,
            resample_interval: defaults::RESAMPLE_INTERVAL,
            resample_model_type: "multinomial".to_string(),
            odom_model_type: "diff".to_string(),
            odom_alpha1: defaults::ODOM_ALPHA,
            odom_alpha2: defaults::ODOM_ALPHA,
            odom_alpha3: defaults::ODOM_ALPHA,
            odom_alpha4: defaults::ODOM_ALPHA,
            odom_alpha5: defaults::ODOM_ALPHA,
            odom_integrator_enabled: false,
            laser_max_beams: defaults::LASER_MAX_BEAMS,
            laser_z_hit: defaults::LASER_Z_HIT,
            laser_z_short: defaults::LASER_Z_SHORT,
            laser_z_max: defaults::LASER_Z_MAX,
            laser_z_rand: defaults::LASER_Z_RAND,
            laser_sigma_hit: defaults::LASER_SIGMA_HIT,
            laser_likelihood_max_dist: defaults::LASER_LIKELIHOOD_MAX_DIST,
            laser_off_map_factor: 1.0,
            laser_non_free_space_factor: 1.0,
            laser_non_free_space_radius: 0.0,
            point_cloud_max_beams: defaults::POINT_CLOUD_MAX_BEAMS,
            point_cloud_max_range: defaults::POINT_CLOUD_MAX_RANGE,
            point_cloud_z_hit: defaults::LASER_Z_HIT,
            point_cloud_z_rand: defaults::LASER_Z_RAND,
            point_cloud_sigma_hit: defaults::LASER_SIGMA_HIT,
            lidar_height: defaults::LIDAR_HEIGHT,
            off_object_penalty_factor: 1.0,
            recovery_alpha_slow: defaults::RECOVERY_ALPHA_SLOW,
            recovery_alpha_fast: defaults::RECOVERY_ALPHA_FAST,
            global_localization_alpha_slow: defaults::RECOVERY_ALPHA_SLOW,
            global_localization_alpha_fast: defaults::RECOVERY_ALPHA_FAST,
            global_localization_off_map_factor: 1.0,
            global_localization_non_free_space_factor: 1.0,
            uniform_pose_starting_weight_threshold: 0.0,
            uniform_pose_deweight_multiplier: 0.0,
            convergence_std_threshold: defaults::CONVERGENCE_STD_THRESHOLD,
            transform_tolerance: defaults::TRANSFORM_TOLERANCE,
            transform_publish_rate: defaults::TRANSFORM_PUBLISH_RATE,
            tf_reverse: false,
            tf_broadcast: true,
            save_pose: false,
            saved_pose_filename: defaults::SAVED_POSE_FILENAME.to_string(),
            save_pose_to_file_rate: defaults::SAVE_POSE_TO_FILE_RATE,
            first_map_only: false,
            scan_check_interval: defaults::SCAN_CHECK_INTERVAL,
            base_frame_id: "base_link".to_string(),
            odom_frame_id: "odom".to_string(),
            global_frame_id: "map".to_string(),
            global_alt_frame_id: String::new(),
            initial_pose_x: 0.0,
            initial_pose_y: 0.0,
            initial_pose_a: 0.0,
            initial_cov_xx: defaults::INITIAL_COV_XX,
            initial_cov_yy: defaults::INITIAL_COV_YY,
            initial_cov_aa: defaults::INITIAL_COV_AA,
        }
    }
}

impl AmclConfig {
    /// Load a configuration from a YAML file and validate it.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config: AmclConfig = serde_yaml::from_str(&text)?;
        config.validate();
        Ok(config)
    }

    /// Repair out-of-range values in place, warning about each fix.
    pub fn validate(&mut self) {
        if self.min_particles > self.max_particles {
            warn!(
                "min_particles {} exceeds max_particles {}; setting them equal",
                self.min_particles, self.max_particles
            );
            self.max_particles = self.min_particles;
        }
        if self.resample_interval == 0 {
            warn!("resample_interval 0 is not allowed; using 1");
            self.resample_interval = 1;
        }
        if self.kld_err <= 0.0 {
            warn!("kld_err must be positive; using {}", defaults::KLD_ERR);
            self.kld_err = defaults::KLD_ERR;
        }
        if self.transform_publish_rate <= 0.0 {
            warn!(
                "transform_publish_rate must be positive; using {}",
                defaults::TRANSFORM_PUBLISH_RATE
            );
            self.transform_publish_rate = defaults::TRANSFORM_PUBLISH_RATE;
        }
    }

    /// Resolved odometry model variant.
    pub fn odom_model_kind(&self) -> OdomModelKind {
        OdomModelKind::parse(&self.odom_model_type)
    }

    /// Resolved resample scheme.
    pub fn resample_model_kind(&self) -> ResampleModelKind {
        ResampleModelKind::parse(&self.resample_model_type)
    }

    /// Alpha coefficients for the motion model.
    pub fn odom_alphas(&self) -> [f64; 5] {
        [
            self.odom_alpha1,
            self.odom_alpha2,
            self.odom_alpha3,
            self.odom_alpha4,
            self.odom_alpha5,
        ]
    }

    /// Parameters of the planar laser model.
    pub fn laser_model_params(&self) -> LaserModelParams {
        LaserModelParams {
            z_hit: self.laser_z_hit,
            z_rand: self.laser_z_rand,
            sigma_hit: self.laser_sigma_hit,
            max_beams: self.laser_max_beams,
            aggregation: BeamAggregation::SumOfCubes,
        }
    }

    /// Parameters of the point-cloud model.
    pub fn point_cloud_model_params(&self) -> PointCloudModelParams {
        PointCloudModelParams {
            z_hit: self.point_cloud_z_hit,
            z_rand: self.point_cloud_z_rand,
            sigma_hit: self.point_cloud_sigma_hit,
            max_range: self.point_cloud_max_range,
            max_beams: self.point_cloud_max_beams,
            off_object_penalty_factor: self.off_object_penalty_factor,
        }
    }

    /// Map factors for normal operation.
    pub fn normal_map_factors(&self) -> MapFactors {
        MapFactors {
            off_map_factor: self.laser_off_map_factor,
            non_free_space_factor: self.laser_non_free_space_factor,
            non_free_space_radius: self.laser_non_free_space_radius,
        }
    }

    /// Map factors while global localization is active.
    pub fn global_localization_map_factors(&self) -> MapFactors {
        MapFactors {
            off_map_factor: self.global_localization_off_map_factor,
            non_free_space_factor: self.global_localization_non_free_space_factor,
            non_free_space_radius: self.laser_non_free_space_radius,
        }
    }

    /// Configured startup pose and covariance.
    pub fn initial_pose(&self) -> (Pose2D, Covariance3) {
        (
            Pose2D::new(self.initial_pose_x, self.initial_pose_y, self.initial_pose_a),
            Covariance3::diagonal(self.initial_cov_xx, self.initial_cov_yy, self.initial_cov_aa),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = AmclConfig::default();
        assert_eq!(config.min_particles, 100);
        assert_eq!(config.max_particles, 5000);
        assert_eq!(config.odom_model_type, "diff");
        assert_eq!(config.resample_model_type, "multinomial");
        assert_eq!(config.resample_interval, 2);
        assert!((config.update_min_a - std::f64::consts::FRAC_PI_6).abs() < 1e-12);
        assert!((config.initial_cov_aa - (std::f64::consts::PI / 12.0).powi(2)).abs() < 1e-12);
    }

    #[test]
    fn test_validate_clamps_particle_bounds() {
        let mut config = AmclConfig {
            min_particles: 800,
            max_particles: 200,
            ..AmclConfig::default()
        };
        config.validate();
        assert_eq!(config.max_particles, 800);
    }

    #[test]
    fn test_unknown_model_strings_fall_back() {
        let config = AmclConfig {
            odom_model_type: "hovercraft".to_string(),
            resample_model_type: "quantum".to_string(),
            ..AmclConfig::default()
        };
        assert_eq!(config.odom_model_kind(), OdomModelKind::Diff);
        assert_eq!(config.resample_model_kind(), ResampleModelKind::Multinomial);
    }

    #[test]
    fn test_partial_yaml_roundtrip() {
        let yaml = "min_particles: 250\nodom_model_type: omni\nlaser_z_hit: 0.9\n";
        let config: AmclConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.min_particles, 250);
        assert_eq!(config.odom_model_kind(), OdomModelKind::Omni);
        assert_eq!(config.laser_z_hit, 0.9);
        // Untouched fields keep their defaults.
        assert_eq!(config.max_particles, 5000);
    }
}
