//! Odometry motion models for the prediction step.
//!
//! Five closed-form samplers over the odometry delta. The `diff` pair is
//! the rot-trans-rot decomposition from Probabilistic Robotics §5.4; the
//! `omni` pair adds a strafe axis; `gaussian` drives its noise from
//! accumulated absolute motion instead of the instantaneous delta. The
//! historical models pass a variance where a standard deviation belongs;
//! the `-corrected` variants take the square root first. Both behaviors
//! are kept because tuned alpha values in the field depend on them.

use log::warn;
use rand::Rng;

use crate::core::math::{angle_diff, gaussian_sample, normalize_angle};
use crate::core::types::{OdomData, Pose2D};

use super::particle_filter::Sample;

/// Which odometry model samples the prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OdomModelKind {
    /// Differential drive, rot-trans-rot decomposition.
    #[default]
    Diff,
    /// Omnidirectional with a strafe axis.
    Omni,
    /// Differential drive with standard-deviation noise arguments.
    DiffCorrected,
    /// Omnidirectional with standard-deviation noise arguments.
    OmniCorrected,
    /// Exact nominal motion plus noise scaled by absolute motion.
    Gaussian,
}

impl OdomModelKind {
    /// Parse a configuration string, falling back to `diff` with a warning
    /// on anything unrecognized.
    pub fn parse(value: &str) -> Self {
        match value {
            "diff" => OdomModelKind::Diff,
            "omni" => OdomModelKind::Omni,
            "diff-corrected" => OdomModelKind::DiffCorrected,
            "omni-corrected" => OdomModelKind::OmniCorrected,
            "gaussian" => OdomModelKind::Gaussian,
            other => {
                warn!("unknown odom model type \"{other}\"; defaulting to diff model");
                OdomModelKind::Diff
            }
        }
    }

    /// Canonical configuration string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OdomModelKind::Diff => "diff",
            OdomModelKind::Omni => "omni",
            OdomModelKind::DiffCorrected => "diff-corrected",
            OdomModelKind::OmniCorrected => "omni-corrected",
            OdomModelKind::Gaussian => "gaussian",
        }
    }
}

/// Odometry motion model: variant plus its noise coefficients.
#[derive(Debug, Clone, Copy)]
pub struct MotionModel {
    kind: OdomModelKind,
    alpha1: f64,
    alpha2: f64,
    alpha3: f64,
    alpha4: f64,
    alpha5: f64,
}

impl MotionModel {
    /// Create a model from a variant and its alpha coefficients.
    /// `alpha5` only matters for the strafe-aware variants.
    pub fn new(kind: OdomModelKind, alphas: [f64; 5]) -> Self {
        Self {
            kind,
            alpha1: alphas[0],
            alpha2: alphas[1],
            alpha3: alphas[2],
            alpha4: alphas[3],
            alpha5: alphas[4],
        }
    }

    /// The configured variant.
    pub fn kind(&self) -> OdomModelKind {
        self.kind
    }

    /// Advance every sample pose by a noisy draw of the measured delta.
    ///
    /// The variant is dispatched once per update, not once per sample.
    pub fn sample_all<R: Rng + ?Sized>(
        &self,
        samples: &mut [Sample],
        data: &OdomData,
        rng: &mut R,
    ) {
        // Pose before this delta; bearings are measured against it.
        let old_pose = Pose2D {
            x: data.pose.x - data.delta.x,
            y: data.pose.y - data.delta.y,
            theta: data.pose.theta - data.delta.theta,
        };

        match self.kind {
            OdomModelKind::Diff => self.sample_diff(samples, data, &old_pose, rng, false),
            OdomModelKind::DiffCorrected => self.sample_diff(samples, data, &old_pose, rng, true),
            OdomModelKind::Omni => self.sample_omni(samples, data, &old_pose, rng, false),
            OdomModelKind::OmniCorrected => self.sample_omni(samples, data, &old_pose, rng, true),
            OdomModelKind::Gaussian => self.sample_gaussian_model(samples, data, &old_pose, rng),
        }

        for sample in samples.iter_mut() {
            sample.pose.theta = normalize_angle(sample.pose.theta);
        }
    }

    fn sample_diff<R: Rng + ?Sized>(
        &self,
        samples: &mut [Sample],
        data: &OdomData,
        old_pose: &Pose2D,
        rng: &mut R,
        corrected: bool,
    ) {
        let delta = &data.delta;
        let delta_trans = (delta.x * delta.x + delta.y * delta.y).sqrt();

        // A bearing computed from two nearly coincident positions is noise;
        // suppress it so in-place rotation stays pure rotation.
        let delta_rot1 = if delta_trans < 0.01 {
            0.0
        } else {
            angle_diff(delta.y.atan2(delta.x), old_pose.theta)
        };
        let delta_rot2 = angle_diff(delta.theta, delta_rot1);

        // Fold backward motion onto the forward case so reversing does not
        // look like a half-turn's worth of rotation noise.
        let rot1_noise = angle_diff(delta_rot1, 0.0)
            .abs()
            .min(angle_diff(delta_rot1, std::f64::consts::PI).abs());
        let rot2_noise = angle_diff(delta_rot2, 0.0)
            .abs()
            .min(angle_diff(delta_rot2, std::f64::consts::PI).abs());

        let rot1_arg = self.alpha1 * rot1_noise * rot1_noise + self.alpha2 * delta_trans * delta_trans;
        let trans_arg = self.alpha3 * delta_trans * delta_trans
            + self.alpha4 * rot1_noise * rot1_noise
            + self.alpha4 * rot2_noise * rot2_noise;
        let rot2_arg = self.alpha1 * rot2_noise * rot2_noise + self.alpha2 * delta_trans * delta_trans;

        let (rot1_arg, trans_arg, rot2_arg) = if corrected {
            (rot1_arg.sqrt(), trans_arg.sqrt(), rot2_arg.sqrt())
        } else {
            (rot1_arg, trans_arg, rot2_arg)
        };

        for sample in samples.iter_mut() {
            let delta_rot1_hat = angle_diff(delta_rot1, gaussian_sample(rng, rot1_arg));
            let delta_trans_hat = delta_trans - gaussian_sample(rng, trans_arg);
            let delta_rot2_hat = angle_diff(delta_rot2, gaussian_sample(rng, rot2_arg));

            sample.pose.x += delta_trans_hat * (sample.pose.theta + delta_rot1_hat).cos();
            sample.pose.y += delta_trans_hat * (sample.pose.theta + delta_rot1_hat).sin();
            sample.pose.theta += delta_rot1_hat + delta_rot2_hat;
        }
    }

    fn sample_omni<R: Rng + ?Sized>(
        &self,
        samples: &mut [Sample],
        data: &OdomData,
        old_pose: &Pose2D,
        rng: &mut R,
        corrected: bool,
    ) {
        let delta = &data.delta;
        let delta_trans = (delta.x * delta.x + delta.y * delta.y).sqrt();
        let delta_rot = delta.theta;

        let trans_arg = self.alpha3 * delta_trans * delta_trans + self.alpha1 * delta_rot * delta_rot;
        let rot_arg = self.alpha4 * delta_rot * delta_rot + self.alpha2 * delta_trans * delta_trans;
        let strafe_arg = self.alpha1 * delta_rot * delta_rot + self.alpha5 * delta_trans * delta_trans;

        let (trans_arg, rot_arg, strafe_arg) = if corrected {
            (trans_arg.sqrt(), rot_arg.sqrt(), strafe_arg.sqrt())
        } else {
            (trans_arg, rot_arg, strafe_arg)
        };

        let travel_heading = angle_diff(delta.y.atan2(delta.x), old_pose.theta);

        for sample in samples.iter_mut() {
            let delta_bearing = travel_heading + sample.pose.theta;
            let (sn_bearing, cs_bearing) = delta_bearing.sin_cos();

            let delta_trans_hat = delta_trans + gaussian_sample(rng, trans_arg);
            let delta_rot_hat = delta_rot + gaussian_sample(rng, rot_arg);
            let delta_strafe_hat = gaussian_sample(rng, strafe_arg);

            sample.pose.x += delta_trans_hat * cs_bearing + delta_strafe_hat * sn_bearing;
            sample.pose.y += delta_trans_hat * sn_bearing - delta_strafe_hat * cs_bearing;
            sample.pose.theta += delta_rot_hat;
        }
    }

    fn sample_gaussian_model<R: Rng + ?Sized>(
        &self,
        samples: &mut [Sample],
        data: &OdomData,
        old_pose: &Pose2D,
        rng: &mut R,
    ) {
        let delta = &data.delta;
        let delta_trans = (delta.x * delta.x + delta.y * delta.y).sqrt();
        let delta_rot = delta.theta;

        let abs_trans2 = data.absolute_motion.x * data.absolute_motion.x;
        let abs_strafe2 = data.absolute_motion.y * data.absolute_motion.y;
        let abs_rot2 = data.absolute_motion.theta * data.absolute_motion.theta;

        let rot_hat_stddev = (self.alpha1 * abs_rot2 + self.alpha2 * abs_trans2).sqrt();
        let trans_hat_stddev = (self.alpha3 * abs_trans2 + self.alpha4 * abs_rot2).sqrt();
        let strafe_hat_stddev = (self.alpha4 * abs_rot2 + self.alpha5 * abs_strafe2).sqrt();

        let travel_heading = angle_diff(delta.y.atan2(delta.x), old_pose.theta);

        for sample in samples.iter_mut() {
            // Estimated direction pointed during the motion.
            let heading = sample.pose.theta + delta_rot / 2.0;
            let (sn_heading, cs_heading) = heading.sin_cos();

            // Relative direction the base actually moved.
            let delta_bearing = travel_heading + sample.pose.theta;
            let (sn_bearing, cs_bearing) = delta_bearing.sin_cos();

            let delta_trans_hat = gaussian_sample(rng, trans_hat_stddev);
            let delta_strafe_hat = gaussian_sample(rng, strafe_hat_stddev);
            let delta_rot_hat = gaussian_sample(rng, rot_hat_stddev);

            // Nominal motion is applied exactly; the draw is pure noise.
            sample.pose.x += delta_trans * cs_bearing;
            sample.pose.y += delta_trans * sn_bearing;
            sample.pose.theta += delta_rot;
            sample.pose.x += delta_trans_hat * cs_heading + delta_strafe_hat * sn_heading;
            sample.pose.y += delta_trans_hat * sn_heading - delta_strafe_hat * cs_heading;
            sample.pose.theta += delta_rot_hat;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    fn samples_at(pose: Pose2D, n: usize) -> Vec<Sample> {
        vec![
            Sample {
                pose,
                weight: 1.0 / n as f64,
            };
            n
        ]
    }

    fn odom(pose: Pose2D, delta: Pose2D) -> OdomData {
        OdomData {
            pose,
            delta,
            absolute_motion: Pose2D::identity(),
        }
    }

    #[test]
    fn test_diff_noise_free_is_exact() {
        let model = MotionModel::new(OdomModelKind::Diff, [0.0; 5]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut samples = samples_at(Pose2D::identity(), 100);
        let data = odom(Pose2D::new(1.0, 0.0, 0.0), Pose2D::new(1.0, 0.0, 0.0));

        model.sample_all(&mut samples, &data, &mut rng);

        for s in &samples {
            assert_relative_eq!(s.pose.x, 1.0, epsilon = 1e-12);
            assert_relative_eq!(s.pose.y, 0.0, epsilon = 1e-12);
            assert_relative_eq!(s.pose.theta, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_all_variants_noise_free_apply_delta() {
        let kinds = [
            OdomModelKind::Diff,
            OdomModelKind::DiffCorrected,
            OdomModelKind::Omni,
            OdomModelKind::OmniCorrected,
            OdomModelKind::Gaussian,
        ];
        for kind in kinds {
            let model = MotionModel::new(kind, [0.0; 5]);
            let mut rng = StdRng::seed_from_u64(2);
            let start = Pose2D::new(0.5, -0.25, 0.3);
            let mut samples = samples_at(start, 10);
            let last = start;
            let now = Pose2D::new(0.9, 0.05, 0.3);
            let data = odom(now, now.delta_from(&last));

            model.sample_all(&mut samples, &data, &mut rng);

            for s in &samples {
                assert_relative_eq!(s.pose.x, 0.9, epsilon = 1e-9);
                assert_relative_eq!(s.pose.y, 0.05, epsilon = 1e-9);
                assert_relative_eq!(s.pose.theta, 0.3, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_diff_in_place_rotation_guard() {
        // A 5 mm jiggle with a 1 rad turn must not synthesize a bearing.
        let model = MotionModel::new(OdomModelKind::Diff, [0.0; 5]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut samples = samples_at(Pose2D::identity(), 1);
        let data = odom(
            Pose2D::new(0.005, 0.0, 1.0),
            Pose2D::new(0.005, 0.0, 1.0),
        );

        model.sample_all(&mut samples, &data, &mut rng);

        // delta_rot1 forced to 0, so the full rotation lands in rot2.
        assert_relative_eq!(samples[0].pose.theta, 1.0, epsilon = 1e-12);
        assert_relative_eq!(samples[0].pose.x, 0.005, epsilon = 1e-12);
    }

    #[test]
    fn test_diff_noise_spreads_with_motion() {
        let model = MotionModel::new(OdomModelKind::Diff, [0.05, 0.05, 0.05, 0.05, 0.05]);
        let mut rng = StdRng::seed_from_u64(4);
        let n = 500;
        let mut samples = samples_at(Pose2D::identity(), n);
        let data = odom(Pose2D::new(1.0, 0.0, 0.0), Pose2D::new(1.0, 0.0, 0.0));

        model.sample_all(&mut samples, &data, &mut rng);

        let mean_x: f64 = samples.iter().map(|s| s.pose.x).sum::<f64>() / n as f64;
        let var_x: f64 = samples
            .iter()
            .map(|s| (s.pose.x - mean_x) * (s.pose.x - mean_x))
            .sum::<f64>()
            / n as f64;
        assert!((mean_x - 1.0).abs() < 0.05, "mean {mean_x}");
        assert!(var_x > 1e-5, "no spread: {var_x}");
    }

    #[test]
    fn test_corrected_variant_scales_noise_differently() {
        // With variance 0.01 the corrected model draws at sigma 0.1 while the
        // historical model draws at "sigma" 0.01; spreads must differ.
        let alphas = [0.0, 0.0, 0.01, 0.0, 0.0];
        let spread = |kind: OdomModelKind| {
            let model = MotionModel::new(kind, alphas);
            let mut rng = StdRng::seed_from_u64(5);
            let n = 400;
            let mut samples = samples_at(Pose2D::identity(), n);
            let data = odom(Pose2D::new(1.0, 0.0, 0.0), Pose2D::new(1.0, 0.0, 0.0));
            model.sample_all(&mut samples, &data, &mut rng);
            let mean: f64 = samples.iter().map(|s| s.pose.x).sum::<f64>() / n as f64;
            samples
                .iter()
                .map(|s| (s.pose.x - mean) * (s.pose.x - mean))
                .sum::<f64>()
                / n as f64
        };
        let plain = spread(OdomModelKind::Diff);
        let corrected = spread(OdomModelKind::DiffCorrected);
        assert!(
            corrected > plain * 10.0,
            "corrected {corrected} vs plain {plain}"
        );
    }

    #[test]
    fn test_omni_strafe_delta() {
        // Pure sideways odometry motion: omni tracks it exactly when
        // noise-free.
        let model = MotionModel::new(OdomModelKind::Omni, [0.0; 5]);
        let mut rng = StdRng::seed_from_u64(6);
        let mut samples = samples_at(Pose2D::identity(), 5);
        let data = odom(Pose2D::new(0.0, 0.5, 0.0), Pose2D::new(0.0, 0.5, 0.0));

        model.sample_all(&mut samples, &data, &mut rng);

        for s in &samples {
            assert_relative_eq!(s.pose.x, 0.0, epsilon = 1e-9);
            assert_relative_eq!(s.pose.y, 0.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_gaussian_uses_absolute_motion_for_noise() {
        let model = MotionModel::new(OdomModelKind::Gaussian, [0.0, 0.0, 0.1, 0.0, 0.0]);
        let n = 300;
        let spread = |abs_motion: Pose2D| {
            let mut rng = StdRng::seed_from_u64(7);
            let mut samples = samples_at(Pose2D::identity(), n);
            let data = OdomData {
                pose: Pose2D::new(0.0, 0.0, 0.0),
                delta: Pose2D::identity(),
                absolute_motion: abs_motion,
            };
            model.sample_all(&mut samples, &data, &mut rng);
            samples.iter().map(|s| s.pose.x * s.pose.x).sum::<f64>() / n as f64
        };
        // Zero net delta but large accumulated motion still spreads.
        let quiet = spread(Pose2D::identity());
        let shaken = spread(Pose2D::new(2.0, 0.0, 0.0));
        assert_eq!(quiet, 0.0);
        assert!(shaken > 1e-4, "no spread from absolute motion: {shaken}");
    }

    #[test]
    fn test_yaw_normalized_after_update() {
        let model = MotionModel::new(OdomModelKind::Diff, [0.0; 5]);
        let mut rng = StdRng::seed_from_u64(8);
        let mut samples = samples_at(Pose2D::new(0.0, 0.0, 3.0), 3);
        let data = odom(Pose2D::new(0.0, 0.0, 0.5), Pose2D::new(0.0, 0.0, 0.5));

        model.sample_all(&mut samples, &data, &mut rng);

        for s in &samples {
            assert!(s.pose.theta > -PI && s.pose.theta <= PI + 1e-12);
        }
    }

    #[test]
    fn test_parse_model_kinds() {
        assert_eq!(OdomModelKind::parse("diff"), OdomModelKind::Diff);
        assert_eq!(OdomModelKind::parse("omni"), OdomModelKind::Omni);
        assert_eq!(
            OdomModelKind::parse("diff-corrected"),
            OdomModelKind::DiffCorrected
        );
        assert_eq!(
            OdomModelKind::parse("omni-corrected"),
            OdomModelKind::OmniCorrected
        );
        assert_eq!(OdomModelKind::parse("gaussian"), OdomModelKind::Gaussian);
        // Unknown strings fall back rather than failing.
        assert_eq!(OdomModelKind::parse("segway"), OdomModelKind::Diff);
    }
}
