//! Foundation types shared across the crate.

mod odometry;
mod pose;
mod scan;

pub use odometry::{AbsoluteMotionIntegrator, OdomData};
pub use pose::{
    covariance_3x3_to_6x6, covariance_6x6_to_3x3, Covariance3, Pose2D, COVARIANCE_6X6_LEN,
    COVARIANCE_INDEX_AA, COVARIANCE_INDEX_XX, COVARIANCE_INDEX_YY,
};
pub use scan::{subsample_step, PlanarScan, PointCloudScan, ScanBeam};

/// A value paired with its acquisition time in microseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamped<T> {
    /// The carried value.
    pub data: T,
    /// Microseconds since an arbitrary epoch; only differences matter.
    pub timestamp_us: u64,
}

impl<T> Timestamped<T> {
    /// Pair a value with a timestamp.
    pub fn new(data: T, timestamp_us: u64) -> Self {
        Self { data, timestamp_us }
    }
}
