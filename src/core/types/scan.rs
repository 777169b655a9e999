//! Range-sensor measurement types consumed by the filter.

use serde::{Deserialize, Serialize};

use super::Pose2D;

/// A single planar range return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanBeam {
    /// Measured range in meters.
    pub range: f64,
    /// Beam bearing in the sensor frame, radians.
    pub bearing: f64,
}

/// One planar laser scan, already unpacked to (range, bearing) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarScan {
    /// Acquisition time in microseconds.
    pub timestamp_us: u64,
    /// Sensor mounting pose in the robot base frame.
    pub sensor_pose: Pose2D,
    /// Reported maximum range of the sensor, meters.
    pub range_max: f64,
    /// The returns.
    pub beams: Vec<ScanBeam>,
}

impl PlanarScan {
    /// Build a scan from parallel range/bearing slices.
    pub fn from_ranges(
        timestamp_us: u64,
        sensor_pose: Pose2D,
        range_max: f64,
        ranges: &[f64],
        bearings: &[f64],
    ) -> Self {
        let beams = ranges
            .iter()
            .zip(bearings.iter())
            .map(|(&range, &bearing)| ScanBeam { range, bearing })
            .collect();
        Self {
            timestamp_us,
            sensor_pose,
            range_max,
            beams,
        }
    }
}

/// One 3D point-cloud scan: endpoints in the sensor frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloudScan {
    /// Acquisition time in microseconds.
    pub timestamp_us: u64,
    /// Sensor mounting pose in the robot base frame (planar part).
    pub sensor_pose: Pose2D,
    /// Endpoints as (x, y, z) in the sensor frame, meters.
    pub points: Vec<[f64; 3]>,
}

/// Uniformly subsample `count` items down to at most `max` by striding.
///
/// Returns the stride to use; a count at or below the cap yields 1.
pub fn subsample_step(count: usize, max: usize) -> usize {
    if count <= 1 || max <= 1 {
        return 1;
    }
    ((count - 1) / (max - 1)).max(1)
}
