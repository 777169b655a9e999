//! Odometry-derived inputs to the motion update.

use crate::core::math::angle_diff;

use super::Pose2D;

/// Action data handed to the motion model for one filter update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdomData {
    /// Odometry-frame pose at the time of the triggering scan.
    pub pose: Pose2D,
    /// Componentwise change since the last filter update, heading through
    /// the shortest arc.
    pub delta: Pose2D,
    /// Accumulated (|forward|, |strafe|, |rotation|) since the last motion
    /// update; zero unless the absolute-motion integrator is in use.
    pub absolute_motion: Pose2D,
}

impl OdomData {
    /// Build action data from consecutive odometry poses.
    pub fn from_poses(pose: Pose2D, last_pose: Pose2D) -> Self {
        Self {
            pose,
            delta: pose.delta_from(&last_pose),
            absolute_motion: Pose2D::identity(),
        }
    }
}

/// Integrates odometry messages into absolute motion along the base axes.
///
/// Each delta's translation is projected onto the average-heading forward
/// and strafe directions; magnitudes accumulate so that back-and-forth
/// motion is not cancelled out. Feeds the `gaussian` motion model and the
/// update-threshold test.
#[derive(Debug, Clone, Default)]
pub struct AbsoluteMotionIntegrator {
    last_pose: Option<Pose2D>,
    accumulated: Pose2D,
}

impl AbsoluteMotionIntegrator {
    /// New integrator with nothing accumulated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated (|forward|, |strafe|, |rotation|).
    pub fn accumulated(&self) -> Pose2D {
        self.accumulated
    }

    /// Total accumulated translation magnitude.
    pub fn translation(&self) -> f64 {
        (self.accumulated.x * self.accumulated.x + self.accumulated.y * self.accumulated.y).sqrt()
    }

    /// Total accumulated rotation magnitude.
    pub fn rotation(&self) -> f64 {
        self.accumulated.theta
    }

    /// Clear the accumulator but keep tracking from the last seen pose.
    pub fn reset(&mut self) {
        self.accumulated = Pose2D::identity();
    }

    /// Forget everything, including the reference pose.
    pub fn clear(&mut self) {
        self.last_pose = None;
        self.accumulated = Pose2D::identity();
    }

    /// Fold one odometry pose into the accumulator.
    pub fn integrate(&mut self, pose: Pose2D) {
        let Some(last) = self.last_pose else {
            self.last_pose = Some(pose);
            return;
        };

        let delta = pose.delta_from(&last);
        let delta_trans = (delta.x * delta.x + delta.y * delta.y).sqrt();
        let delta_rot = delta.theta;

        // Project the translation onto the average heading over the step;
        // x is forward, y is strafe. A vanishing translation is treated as
        // forward so in-place rotation contributes no strafe.
        let delta_bearing = if delta_trans < 1e-6 {
            0.0
        } else {
            angle_diff(delta.y.atan2(delta.x), last.theta + delta_rot / 2.0)
        };

        self.accumulated.x += (delta_trans * delta_bearing.cos()).abs();
        self.accumulated.y += (delta_trans * delta_bearing.sin()).abs();
        self.accumulated.theta += delta_rot.abs();
        self.last_pose = Some(pose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_delta_through_angle_diff() {
        let data = OdomData::from_poses(
            Pose2D::new(1.0, 0.5, -3.0),
            Pose2D::new(0.0, 0.0, 3.0),
        );
        assert_relative_eq!(data.delta.x, 1.0);
        assert_relative_eq!(data.delta.y, 0.5);
        // 3.0 -> -3.0 is a short hop across the seam, not a near-full turn.
        assert!(data.delta.theta.abs() < 0.3);
    }

    #[test]
    fn test_integrator_forward_motion() {
        let mut integ = AbsoluteMotionIntegrator::new();
        for i in 0..=10 {
            integ.integrate(Pose2D::new(0.1 * i as f64, 0.0, 0.0));
        }
        assert_relative_eq!(integ.accumulated().x, 1.0, epsilon = 1e-9);
        assert_relative_eq!(integ.accumulated().y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(integ.accumulated().theta, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_integrator_back_and_forth_accumulates() {
        let mut integ = AbsoluteMotionIntegrator::new();
        integ.integrate(Pose2D::new(0.0, 0.0, 0.0));
        integ.integrate(Pose2D::new(1.0, 0.0, 0.0));
        integ.integrate(Pose2D::new(0.0, 0.0, 0.0));
        // Net displacement is zero but absolute motion is 2 m.
        assert_relative_eq!(integ.translation(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_integrator_in_place_rotation_is_not_strafe() {
        let mut integ = AbsoluteMotionIntegrator::new();
        integ.integrate(Pose2D::new(0.0, 0.0, 0.0));
        integ.integrate(Pose2D::new(0.0, 0.0, FRAC_PI_2));
        assert_relative_eq!(integ.accumulated().y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(integ.accumulated().theta, FRAC_PI_2, epsilon = 1e-9);
    }

    #[test]
    fn test_integrator_reset_keeps_reference() {
        let mut integ = AbsoluteMotionIntegrator::new();
        integ.integrate(Pose2D::new(0.0, 0.0, 0.0));
        integ.integrate(Pose2D::new(1.0, 0.0, 0.0));
        integ.reset();
        assert_relative_eq!(integ.translation(), 0.0);
        integ.integrate(Pose2D::new(2.0, 0.0, 0.0));
        assert_relative_eq!(integ.translation(), 1.0, epsilon = 1e-9);
    }
}
