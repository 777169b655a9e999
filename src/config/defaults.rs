//! Default configuration values.

pub const MIN_PARTICLES: usize = 100;
pub const MAX_PARTICLES: usize = 5000;
pub const KLD_ERR: f64 = 0.01;
pub const KLD_Z: f64 = 0.99;

pub const UPDATE_MIN_D: f64 = 0.2;
pub const UPDATE_MIN_A: f64 = std::f64::consts::FRAC_PI_6;
pub const RESAMPLE_INTERVAL: u32 = 2;

pub const ODOM_ALPHA: f64 = 0.2;

pub const LASER_MAX_BEAMS: usize = 30;
pub const LASER_Z_HIT: f64 = 0.95;
pub const LASER_Z_SHORT: f64 = 0.1;
pub const LASER_Z_MAX: f64 = 0.05;
pub const LASER_Z_RAND: f64 = 0.05;
pub const LASER_SIGMA_HIT: f64 = 0.2;
pub const LASER_LIKELIHOOD_MAX_DIST: f64 = 2.0;

pub const POINT_CLOUD_MAX_BEAMS: usize = 256;
pub const POINT_CLOUD_MAX_RANGE: f64 = 20.0;
pub const LIDAR_HEIGHT: f64 = 1.8;

pub const RECOVERY_ALPHA_SLOW: f64 = 0.001;
pub const RECOVERY_ALPHA_FAST: f64 = 0.1;

pub const CONVERGENCE_STD_THRESHOLD: f64 = 0.05;

pub const TRANSFORM_TOLERANCE: f64 = 0.1;
pub const TRANSFORM_PUBLISH_RATE: f64 = 50.0;

pub const SAVED_POSE_FILENAME: &str = "savedpose.yaml";
pub const SAVE_POSE_TO_FILE_RATE: f64 = 0.1;

pub const SCAN_CHECK_INTERVAL: f64 = 15.0;

pub const INITIAL_COV_XX: f64 = 0.5 * 0.5;
pub const INITIAL_COV_YY: f64 = 0.5 * 0.5;
/// (π/12)², a loose 15° heading prior.
pub const INITIAL_COV_AA: f64 =
    (std::f64::consts::PI / 12.0) * (std::f64::consts::PI / 12.0);
