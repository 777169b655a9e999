//! The localization update loop.
//!
//! [`Localizer`] is the callback surface the messaging layer drives: maps,
//! odometry, scans and initial poses come in; pose estimates, the particle
//! cloud and the map→odom transform come out. Callbacks may arrive on any
//! thread; one coarse mutex serializes everything that touches the filter,
//! and two small ones cover the published transform and the latest pose so
//! readers never contend with a running update.
//!
//! A malformed or ill-timed input never unwinds out of a callback: the
//! cycle is dropped, a log line says why, and the filter keeps its previous
//! state.

use std::collections::VecDeque;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::algorithms::localization::{
    LikelihoodFieldModel, MotionModel, ParticleFilter, PointCloudModel, Sample,
};
use crate::algorithms::mapping::{MapModel, OccupancyGridMsg, OccupancyMap, OctreeField, OctreeSummary};
use crate::config::AmclConfig;
use crate::core::types::{
    covariance_3x3_to_6x6, covariance_6x6_to_3x3, AbsoluteMotionIntegrator, Covariance3, OdomData,
    PlanarScan, PointCloudScan, Pose2D, Timestamped, COVARIANCE_6X6_LEN, COVARIANCE_INDEX_AA,
    COVARIANCE_INDEX_XX, COVARIANCE_INDEX_YY,
};
use crate::error::Result;
use crate::io::pose_file::{save_pose_file, SavedPose};

/// Odometry history retained for scan-time pose lookup, microseconds.
const ODOM_BUFFER_HORIZON_US: u64 = 10_000_000;

/// How far past the newest odometry a scan stamp may run before the
/// lookup is declared failed, microseconds.
const ODOM_EXTRAPOLATION_LIMIT_US: u64 = 500_000;

/// A published pose estimate in the global frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEstimate {
    /// Scan time the estimate corresponds to.
    pub timestamp_us: u64,
    /// Global frame identifier.
    pub frame_id: String,
    /// Estimated pose.
    pub pose: Pose2D,
    /// Row-major 6×6 covariance: the whole-set covariance, so it reflects
    /// total filter uncertainty rather than the chosen mode's spread.
    pub covariance: [f64; COVARIANCE_6X6_LEN],
}

/// What one scan callback did.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// False when the scan was dropped (no map, no odometry, wrong kind).
    pub processed: bool,
    /// Whether motion and sensor updates ran.
    pub filter_updated: bool,
    /// Whether a resample committed this cycle.
    pub resampled: bool,
    /// Estimate published this cycle, if any.
    pub estimate: Option<PoseEstimate>,
}

/// A scan of either supported kind.
enum ScanData {
    Planar(PlanarScan),
    Cloud(PointCloudScan),
}

impl ScanData {
    fn timestamp_us(&self) -> u64 {
        match self {
            ScanData::Planar(scan) => scan.timestamp_us,
            ScanData::Cloud(scan) => scan.timestamp_us,
        }
    }
}

/// Everything the coarse mutex guards.
struct FilterContext {
    config: AmclConfig,
    map: Option<MapModel>,
    free_space: Vec<(i32, i32)>,
    pf: Option<ParticleFilter>,
    motion: MotionModel,
    laser: LikelihoodFieldModel,
    cloud: PointCloudModel,
    /// Whether the odometry baseline has been established.
    pf_init: bool,
    /// Odometry pose at the last filter update.
    pf_odom_pose: Pose2D,
    resample_count: u32,
    force_update: bool,
    /// Per-sensor pending-update flags, set together when motion exceeds
    /// the thresholds.
    planar_update: bool,
    cloud_update: bool,
    global_localization_active: bool,
    odom_buffer: VecDeque<Timestamped<Pose2D>>,
    integrator: AbsoluteMotionIntegrator,
    last_planar_scan: Option<PlanarScan>,
    last_cloud_scan: Option<PointCloudScan>,
    /// Startup pose applied when a map arrives.
    init_pose: Pose2D,
    init_cov: Covariance3,
    /// Initial pose received before any map was installed.
    pending_initial_pose: Option<(Pose2D, Covariance3)>,
    rng: StdRng,
    first_map_received: bool,
    last_scan_received_us: Option<u64>,
    last_save_us: Option<u64>,
    sent_first_estimate: bool,
}

/// Adaptive Monte Carlo localizer.
pub struct Localizer {
    inner: Mutex<FilterContext>,
    latest_tf: Mutex<Option<Pose2D>>,
    latest_pose: Mutex<Option<PoseEstimate>>,
}

impl Localizer {
    /// Create a localizer; the RNG is seeded from the OS.
    pub fn new(config: AmclConfig) -> Self {
        Self::with_seed(config, rand::thread_rng().gen())
    }

    /// Create a localizer with a fixed RNG seed for reproducible runs.
    pub fn with_seed(mut config: AmclConfig, seed: u64) -> Self {
        config.validate();
        let (init_pose, init_cov) = config.initial_pose();
        let motion = MotionModel::new(config.odom_model_kind(), config.odom_alphas());
        let mut laser = LikelihoodFieldModel::new(config.laser_model_params());
        laser.set_map_factors(config.normal_map_factors());
        let mut cloud = PointCloudModel::new(config.point_cloud_model_params());
        cloud.set_map_factors(config.normal_map_factors());

        Self {
            inner: Mutex::new(FilterContext {
                config,
                map: None,
                free_space: Vec::new(),
                pf: None,
                motion,
                laser,
                cloud,
                pf_init: false,
                pf_odom_pose: Pose2D::identity(),
                resample_count: 0,
                force_update: false,
                planar_update: false,
                cloud_update: false,
                global_localization_active: false,
                odom_buffer: VecDeque::new(),
                integrator: AbsoluteMotionIntegrator::new(),
                last_planar_scan: None,
                last_cloud_scan: None,
                init_pose,
                init_cov,
                pending_initial_pose: None,
                rng: StdRng::seed_from_u64(seed),
                first_map_received: false,
                last_scan_received_us: None,
                last_save_us: None,
                sent_first_estimate: false,
            }),
            latest_tf: Mutex::new(None),
            latest_pose: Mutex::new(None),
        }
    }

    /// Replace the startup pose with one loaded from the saved-pose file.
    ///
    /// NaNs or an unreadable file fall back to the configured default and
    /// report false; the localizer stays usable either way.
    pub fn load_saved_pose(&self) -> bool {
        let mut ctx = self.inner.lock();
        let path = ctx.config.saved_pose_filename.clone();
        match crate::io::pose_file::load_pose_file(&path) {
            Ok(saved) if saved.is_finite() => {
                let pose = saved.pose2d();
                let (xx, yy, aa) = saved.planar_variances();
                info!("loaded saved pose ({:.3}, {:.3}) from {path}", pose.x, pose.y);
                ctx.init_pose = pose;
                ctx.init_cov = Covariance3::diagonal(xx, yy, aa);
                true
            }
            Ok(_) => {
                warn!("saved pose in {path} contains NaN; using default initial pose");
                false
            }
            Err(e) => {
                warn!("failed to load saved pose from {path}: {e}; using default initial pose");
                false
            }
        }
    }

    /// Install a new occupancy-grid map and reset the filter onto it.
    pub fn handle_occupancy_map(&self, msg: &OccupancyGridMsg) {
        let mut ctx = self.inner.lock();
        if ctx.config.first_map_only && ctx.first_map_received {
            debug!("ignoring map message: first_map_only is set");
            return;
        }
        let mut map = OccupancyMap::from_msg(msg);
        map.update_cspace(ctx.config.laser_likelihood_max_dist);
        let model = MapModel::Occupancy(std::sync::Arc::new(map));
        info!(
            "installing occupancy map {}x{} @ {} m",
            msg.width, msg.height, msg.resolution
        );
        Self::install_map(&mut ctx, model);
    }

    /// Install a new octree-derived map and reset the filter onto it.
    pub fn handle_octree_map(&self, summary: &OctreeSummary) {
        let mut ctx = self.inner.lock();
        if ctx.config.first_map_only && ctx.first_map_received {
            debug!("ignoring octree message: first_map_only is set");
            return;
        }
        let mut summary = summary.clone();
        summary.lidar_height = ctx.config.lidar_height;
        let field = OctreeField::from_summary(&summary, ctx.config.laser_likelihood_max_dist);
        let model = MapModel::OctreeDerived(std::sync::Arc::new(field));
        info!(
            "installing octree-derived field from {} occupied leaves",
            summary.occupied.len()
        );
        Self::install_map(&mut ctx, model);
    }

    fn install_map(ctx: &mut FilterContext, model: MapModel) {
        ctx.free_space = model.free_space_indices();
        if ctx.free_space.is_empty() {
            warn!("installed map has no free space; global localization will be unavailable");
        }
        ctx.map = Some(model);
        ctx.first_map_received = true;

        let mut pf = ParticleFilter::new(
            ctx.config.min_particles,
            ctx.config.max_particles,
            ctx.config.recovery_alpha_slow,
            ctx.config.recovery_alpha_fast,
        );
        pf.set_population_size_parameters(ctx.config.kld_err, ctx.config.kld_z);
        pf.set_resample_model(ctx.config.resample_model_kind());
        pf.set_convergence_threshold(ctx.config.convergence_std_threshold);

        let (mean, cov) = ctx
            .pending_initial_pose
            .take()
            .unwrap_or((ctx.init_pose, ctx.init_cov));
        pf.init(mean, cov, &mut ctx.rng);
        ctx.pf = Some(pf);
        ctx.pf_init = false;
        ctx.resample_count = 0;

        ctx.motion = MotionModel::new(ctx.config.odom_model_kind(), ctx.config.odom_alphas());
    }

    /// Feed one stamped odometry pose.
    ///
    /// Maintains the interpolation buffer used to pair scans with odometry
    /// and, when enabled, the absolute-motion integrator.
    pub fn handle_odometry(&self, odom: Timestamped<Pose2D>) {
        let mut ctx = self.inner.lock();
        if !odom.data.is_finite() {
            warn!("dropping odometry with non-finite pose");
            return;
        }
        // Timestamps, not arrival order, decide pairing; reject regressions.
        if let Some(last) = ctx.odom_buffer.back() {
            if odom.timestamp_us < last.timestamp_us {
                warn!(
                    "dropping odometry that runs backwards in time ({} < {})",
                    odom.timestamp_us, last.timestamp_us
                );
                return;
            }
        }
        if ctx.config.odom_integrator_enabled {
            ctx.integrator.integrate(odom.data);
        }
        ctx.odom_buffer.push_back(odom);
        let horizon = odom.timestamp_us.saturating_sub(ODOM_BUFFER_HORIZON_US);
        while let Some(front) = ctx.odom_buffer.front() {
            if front.timestamp_us < horizon && ctx.odom_buffer.len() > 2 {
                ctx.odom_buffer.pop_front();
            } else {
                break;
            }
        }
    }

    /// Process one planar laser scan.
    pub fn handle_planar_scan(&self, scan: PlanarScan) -> ScanOutcome {
        self.run_update(ScanData::Planar(scan))
    }

    /// Process one point-cloud scan.
    pub fn handle_point_cloud(&self, scan: PointCloudScan) -> ScanOutcome {
        self.run_update(ScanData::Cloud(scan))
    }

    fn run_update(&self, scan: ScanData) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let stamp = scan.timestamp_us();
        let mut ctx = self.inner.lock();
        let ctx = &mut *ctx;
        ctx.last_scan_received_us = Some(stamp);

        // The map must exist and match the scan kind.
        let matches = match (&ctx.map, &scan) {
            (Some(MapModel::Occupancy(_)), ScanData::Planar(_)) => true,
            (Some(MapModel::OctreeDerived(_)), ScanData::Cloud(_)) => true,
            (None, _) => {
                debug!("dropping scan: no map installed");
                false
            }
            _ => {
                debug!("dropping scan: map kind does not match scan kind");
                false
            }
        };
        if !matches {
            return outcome;
        }
        let Some(pf) = ctx.pf.as_mut() else {
            debug!("dropping scan: filter not constructed");
            return outcome;
        };

        // Leaving global localization (via initial pose or reconfigure)
        // must restore the normal decay rates and map factors even if no
        // resample noticed; cheap and idempotent, done every scan.
        if !ctx.global_localization_active {
            pf.set_decay_rates(
                ctx.config.recovery_alpha_slow,
                ctx.config.recovery_alpha_fast,
            );
            let factors = ctx.config.normal_map_factors();
            ctx.laser.set_map_factors(factors);
            ctx.cloud.set_map_factors(factors);
        }

        let Some(odom_pose) = Self::odom_pose_at(&ctx.odom_buffer, stamp) else {
            warn!("couldn't determine robot's odometry pose for scan at {stamp}; dropping scan");
            return outcome;
        };
        outcome.processed = true;

        // Decide whether this scan triggers a filter update.
        let mut delta = Pose2D::identity();
        if ctx.pf_init {
            delta = odom_pose.delta_from(&ctx.pf_odom_pose);
            let update = if ctx.config.odom_integrator_enabled {
                ctx.integrator.translation() >= ctx.config.update_min_d
                    || ctx.integrator.rotation() >= ctx.config.update_min_a
            } else {
                delta.x.abs() > ctx.config.update_min_d
                    || delta.y.abs() > ctx.config.update_min_d
                    || delta.theta.abs() > ctx.config.update_min_a
            };
            let update = update || ctx.force_update;
            ctx.force_update = false;
            if update {
                ctx.planar_update = true;
                ctx.cloud_update = true;
            }
        }

        let this_scan_update = match &scan {
            ScanData::Planar(_) => ctx.planar_update,
            ScanData::Cloud(_) => ctx.cloud_update,
        };

        let mut force_publication = false;
        if !ctx.pf_init {
            ctx.pf_odom_pose = odom_pose;
            ctx.pf_init = true;
            ctx.planar_update = true;
            ctx.cloud_update = true;
            force_publication = true;
            ctx.resample_count = 0;
            ctx.integrator.clear();
        } else if this_scan_update {
            let odata = OdomData {
                pose: odom_pose,
                delta,
                absolute_motion: ctx.integrator.accumulated(),
            };
            ctx.motion
                .sample_all(pf.current_samples_mut(), &odata, &mut ctx.rng);
            ctx.integrator.reset();
        }

        let this_scan_update = match &scan {
            ScanData::Planar(_) => ctx.planar_update,
            ScanData::Cloud(_) => ctx.cloud_update,
        };
        if this_scan_update {
            let map = ctx.map.as_ref().expect("checked above").clone();
            match &scan {
                ScanData::Planar(planar) => {
                    let laser = &ctx.laser;
                    pf.update_observation(|samples| {
                        laser.apply_to_samples(map.grid(), planar, samples)
                    });
                    ctx.last_planar_scan = Some(planar.clone());
                    ctx.planar_update = false;
                }
                ScanData::Cloud(cloud_scan) => {
                    if let MapModel::OctreeDerived(field) = &map {
                        let cloud = &ctx.cloud;
                        pf.update_observation(|samples| {
                            cloud.apply_to_samples(field, cloud_scan, samples)
                        });
                    }
                    ctx.last_cloud_scan = Some(cloud_scan.clone());
                    ctx.cloud_update = false;
                }
            }
            outcome.filter_updated = true;
            ctx.pf_odom_pose = odom_pose;

            ctx.resample_count += 1;
            if ctx.resample_count % ctx.config.resample_interval == 0 {
                {
                    let mut uniform = Self::uniform_pose_fn(
                        &map,
                        &ctx.free_space,
                        &ctx.laser,
                        &ctx.cloud,
                        &ctx.last_planar_scan,
                        &ctx.last_cloud_scan,
                        ctx.config.uniform_pose_starting_weight_threshold,
                        ctx.config.uniform_pose_deweight_multiplier,
                    );
                    pf.update_resample(&mut ctx.rng, Some(&mut uniform));
                }
                outcome.resampled = true;

                if pf.converged() && ctx.global_localization_active {
                    info!("global localization converged");
                    ctx.global_localization_active = false;
                    pf.set_decay_rates(
                        ctx.config.recovery_alpha_slow,
                        ctx.config.recovery_alpha_fast,
                    );
                    let factors = ctx.config.normal_map_factors();
                    ctx.laser.set_map_factors(factors);
                    ctx.cloud.set_map_factors(factors);
                }
            }
        }

        if outcome.resampled || force_publication {
            let set = pf.current_set();
            match set.best_cluster() {
                Some(best) if best.weight > 0.0 => {
                    let estimate = PoseEstimate {
                        timestamp_us: stamp,
                        frame_id: ctx.config.global_frame_id.clone(),
                        pose: best.mean,
                        covariance: covariance_3x3_to_6x6(&set.cov()),
                    };
                    *self.latest_pose.lock() = Some(estimate.clone());
                    ctx.sent_first_estimate = true;

                    // The transform that maps the odometry-frame pose onto
                    // the cluster mean: T ∘ (base→odom) = (base→map).
                    let map_to_odom = best.mean.compose(&odom_pose.inverse());
                    *self.latest_tf.lock() = Some(map_to_odom);

                    outcome.estimate = Some(estimate);
                }
                _ => {
                    error!("no cluster carries weight; publishing nothing this cycle");
                }
            }
        } else if self.latest_tf.lock().is_some() {
            self.attempt_save_pose_locked(ctx, stamp);
        }

        outcome
    }

    /// Uniform free-space pose generator with optional likelihood vetting.
    ///
    /// With a positive starting threshold and a sane multiplier, freshly
    /// drawn poses are scored against the last scan and redrawn until one
    /// clears a threshold that decays with every rejection.
    #[allow(clippy::too_many_arguments)]
    fn uniform_pose_fn<'a>(
        map: &'a MapModel,
        free_space: &'a [(i32, i32)],
        laser: &'a LikelihoodFieldModel,
        cloud: &'a PointCloudModel,
        last_planar: &'a Option<PlanarScan>,
        last_cloud: &'a Option<PointCloudScan>,
        starting_weight_threshold: f64,
        deweight_multiplier: f64,
    ) -> impl FnMut(&mut StdRng) -> Pose2D + 'a {
        let score = move |pose: &Pose2D| -> f64 {
            match map {
                MapModel::Occupancy(grid) => match last_planar {
                    Some(scan) => laser.score_pose(grid, scan, pose),
                    None => 1.0,
                },
                MapModel::OctreeDerived(field) => match last_cloud {
                    Some(scan) => cloud.score_pose(field, scan, pose),
                    None => 1.0,
                },
            }
        };

        move |rng: &mut StdRng| {
            let draw = |rng: &mut StdRng| -> Pose2D {
                if free_space.is_empty() {
                    warn!("free-space index is empty; generating origin pose");
                    return Pose2D::identity();
                }
                let index = rng.gen_range(0..free_space.len());
                let (i, j) = free_space[index];
                let (wx, wy) = map.grid().map_to_world(i, j);
                let theta = rng.gen::<f64>() * 2.0 * std::f64::consts::PI - std::f64::consts::PI;
                Pose2D::new(wx, wy, theta)
            };

            let mut pose = draw(rng);
            let mut good_weight = starting_weight_threshold;
            if good_weight > 0.0 && (0.0..1.0).contains(&deweight_multiplier) {
                while score(&pose) < good_weight {
                    pose = draw(rng);
                    good_weight *= deweight_multiplier;
                }
            }
            pose
        }
    }

    /// Handle an initial-pose message.
    ///
    /// Past stamps are honored by composing in the odometry motion between
    /// the stamp and `now_us`. Poses in an unknown frame, or with NaN
    /// position, are dropped; NaN covariance entries are replaced by the
    /// defaults.
    pub fn set_initial_pose(
        &self,
        frame_id: &str,
        pose: Timestamped<Pose2D>,
        covariance: &[f64; COVARIANCE_6X6_LEN],
        now_us: u64,
    ) {
        let mut ctx = self.inner.lock();
        let ctx = &mut *ctx;

        let frame = if !ctx.config.global_alt_frame_id.is_empty()
            && frame_id == ctx.config.global_alt_frame_id
        {
            ctx.config.global_frame_id.as_str()
        } else {
            frame_id
        };
        if frame.is_empty() {
            warn!("received initial pose with empty frame_id; assuming the global frame");
        } else if frame != ctx.config.global_frame_id {
            warn!(
                "ignoring initial pose in frame \"{frame}\"; initial poses must be in \"{}\"",
                ctx.config.global_frame_id
            );
            return;
        }

        if !pose.data.is_finite() {
            warn!("received initial pose with non-finite value; ignoring pose");
            return;
        }

        let mut cov = *covariance;
        let defaults = [
            (COVARIANCE_INDEX_XX, ctx.config.initial_cov_xx),
            (COVARIANCE_INDEX_YY, ctx.config.initial_cov_yy),
            (COVARIANCE_INDEX_AA, ctx.config.initial_cov_aa),
        ];
        for value in cov.iter_mut() {
            if value.is_nan() {
                *value = 0.0;
            }
        }
        for (index, fallback) in defaults {
            if covariance[index].is_nan() {
                cov[index] = fallback;
            }
        }

        // A pose estimated in the past is carried forward through whatever
        // odometry happened since.
        let tx_odom = match (
            Self::odom_pose_at(&ctx.odom_buffer, pose.timestamp_us),
            Self::odom_pose_at(&ctx.odom_buffer, now_us),
        ) {
            (Some(then), Some(now)) => then.inverse().compose(&now),
            _ => {
                if ctx.sent_first_estimate {
                    warn!("failed to look up odometry motion since the initial pose stamp");
                }
                Pose2D::identity()
            }
        };
        let pose_new = pose.data.compose(&tx_odom);

        info!(
            "initial pose received: ({:.3}, {:.3}, {:.3})",
            pose_new.x, pose_new.y, pose_new.theta
        );

        let cov3 = covariance_6x6_to_3x3(&cov);
        if let Some(pf) = ctx.pf.as_mut() {
            pf.init(pose_new, cov3, &mut ctx.rng);
            ctx.pf_init = false;
        } else {
            ctx.pending_initial_pose = Some((pose_new, cov3));
        }
        ctx.global_localization_active = false;
    }

    /// Re-seed the filter uniformly over free space with aggressive decay
    /// rates; normal rates return once the filter reconverges.
    pub fn global_localization(&self) {
        let mut ctx = self.inner.lock();
        let ctx = &mut *ctx;
        let Some(map) = ctx.map.as_ref() else {
            debug!("global localization requested before any map; ignoring");
            return;
        };
        let Some(pf) = ctx.pf.as_mut() else {
            return;
        };

        info!("initiating global localization");
        ctx.global_localization_active = true;
        pf.set_decay_rates(
            ctx.config.global_localization_alpha_slow,
            ctx.config.global_localization_alpha_fast,
        );
        let factors = ctx.config.global_localization_map_factors();
        ctx.laser.set_map_factors(factors);
        ctx.cloud.set_map_factors(factors);

        let mut uniform = Self::uniform_pose_fn(
            map,
            &ctx.free_space,
            &ctx.laser,
            &ctx.cloud,
            &ctx.last_planar_scan,
            &ctx.last_cloud_scan,
            ctx.config.uniform_pose_starting_weight_threshold,
            ctx.config.uniform_pose_deweight_multiplier,
        );
        let rng = &mut ctx.rng;
        pf.init_model(|| uniform(&mut *rng));
        ctx.pf_init = false;
    }

    /// Apply a new configuration, rebuilding the filter and models.
    ///
    /// The filter re-initializes from the last published pose when one
    /// exists, otherwise from the startup pose.
    pub fn reconfigure(&self, mut config: AmclConfig) {
        config.validate();
        let mut ctx = self.inner.lock();
        let ctx = &mut *ctx;

        ctx.motion = MotionModel::new(config.odom_model_kind(), config.odom_alphas());
        ctx.laser = LikelihoodFieldModel::new(config.laser_model_params());
        ctx.laser.set_map_factors(config.normal_map_factors());
        ctx.cloud = PointCloudModel::new(config.point_cloud_model_params());
        ctx.cloud.set_map_factors(config.normal_map_factors());

        if ctx.map.is_some() {
            let mut pf = ParticleFilter::new(
                config.min_particles,
                config.max_particles,
                config.recovery_alpha_slow,
                config.recovery_alpha_fast,
            );
            pf.set_population_size_parameters(config.kld_err, config.kld_z);
            pf.set_resample_model(config.resample_model_kind());
            pf.set_convergence_threshold(config.convergence_std_threshold);

            let (mean, cov) = match self.latest_pose.lock().as_ref() {
                Some(estimate) => (estimate.pose, covariance_6x6_to_3x3(&estimate.covariance)),
                None => (ctx.init_pose, ctx.init_cov),
            };
            pf.init(mean, cov, &mut ctx.rng);
            ctx.pf = Some(pf);
            ctx.pf_init = false;
        }

        ctx.config = config;
    }

    /// Latest published pose estimate.
    pub fn latest_pose(&self) -> Option<PoseEstimate> {
        self.latest_pose.lock().clone()
    }

    /// Current particle poses, for visualization.
    pub fn particle_cloud(&self) -> Vec<Pose2D> {
        let ctx = self.inner.lock();
        match &ctx.pf {
            Some(pf) => pf
                .current_set()
                .samples()
                .iter()
                .map(|s: &Sample| s.pose)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Latest map→odom transform, if the filter has produced one.
    pub fn map_to_odom(&self) -> Option<Pose2D> {
        *self.latest_tf.lock()
    }

    /// The transform as configured for publication: map→odom, or its
    /// inverse under `tf_reverse`. None when broadcasting is off or no
    /// transform exists yet.
    pub fn published_transform(&self) -> Option<Pose2D> {
        let ctx = self.inner.lock();
        if !ctx.config.tf_broadcast {
            return None;
        }
        let reverse = ctx.config.tf_reverse;
        drop(ctx);
        self.latest_tf
            .lock()
            .map(|tf| if reverse { tf.inverse() } else { tf })
    }

    /// Parameters the transform-publisher thread needs.
    pub(crate) fn transform_publish_params(&self) -> (f64, f64, String, String, bool) {
        let ctx = self.inner.lock();
        (
            ctx.config.transform_publish_rate,
            ctx.config.transform_tolerance,
            ctx.config.global_frame_id.clone(),
            ctx.config.odom_frame_id.clone(),
            ctx.config.tf_reverse,
        )
    }

    /// Force the next scan to run a full filter update.
    pub fn force_update(&self) {
        self.inner.lock().force_update = true;
    }

    /// Whether the particle set has converged.
    pub fn converged(&self) -> bool {
        let ctx = self.inner.lock();
        ctx.pf.as_ref().map(|pf| pf.converged()).unwrap_or(false)
    }

    /// Whether global localization is still running.
    pub fn global_localization_active(&self) -> bool {
        self.inner.lock().global_localization_active
    }

    /// Warn (and report the gap) when no scan has arrived within the
    /// configured interval; meant to be driven by a caller-side timer.
    pub fn check_scan_receipt(&self, now_us: u64) -> Option<f64> {
        let ctx = self.inner.lock();
        let interval = ctx.config.scan_check_interval;
        if interval <= 0.0 {
            return None;
        }
        let elapsed = match ctx.last_scan_received_us {
            Some(last) => (now_us.saturating_sub(last)) as f64 / 1e6,
            None => return None,
        };
        if elapsed > interval {
            warn!(
                "no scan received (and thus no pose updates published) for {elapsed:.1} s"
            );
            Some(elapsed)
        } else {
            None
        }
    }

    /// Write the latest pose to the saved-pose file if saving is enabled,
    /// regardless of the periodic schedule.
    pub fn save_pose_now(&self, now_us: u64) -> Result<bool> {
        let ctx = self.inner.lock();
        if !ctx.config.save_pose {
            debug!("as specified, not saving pose to file");
            return Ok(false);
        }
        let Some(estimate) = self.latest_pose.lock().clone() else {
            return Ok(false);
        };
        let saved = SavedPose::from_estimate(
            &ctx.config.global_frame_id,
            now_us,
            &estimate.pose,
            &estimate.covariance,
        );
        save_pose_file(&ctx.config.saved_pose_filename, &saved)?;
        Ok(true)
    }

    fn attempt_save_pose_locked(&self, ctx: &mut FilterContext, now_us: u64) {
        if !ctx.config.save_pose || ctx.config.save_pose_to_file_rate <= 0.0 {
            return;
        }
        let period_us = (1e6 / ctx.config.save_pose_to_file_rate) as u64;
        let due = match ctx.last_save_us {
            Some(last) => now_us.saturating_sub(last) >= period_us,
            None => true,
        };
        if !due {
            return;
        }
        let Some(estimate) = self.latest_pose.lock().clone() else {
            return;
        };
        let saved = SavedPose::from_estimate(
            &ctx.config.global_frame_id,
            now_us,
            &estimate.pose,
            &estimate.covariance,
        );
        if let Err(e) = save_pose_file(&ctx.config.saved_pose_filename, &saved) {
            warn!("failed to save pose: {e}");
        } else {
            ctx.last_save_us = Some(now_us);
        }
    }

    /// Odometry pose at `stamp`, interpolated from the buffer. A stamp a
    /// little past the newest entry uses that entry; older or further-out
    /// stamps fail the lookup.
    fn odom_pose_at(buffer: &VecDeque<Timestamped<Pose2D>>, stamp: u64) -> Option<Pose2D> {
        let first = buffer.front()?;
        let last = buffer.back()?;

        if stamp < first.timestamp_us {
            return None;
        }
        if stamp > last.timestamp_us {
            if stamp - last.timestamp_us <= ODOM_EXTRAPOLATION_LIMIT_US {
                return Some(last.data);
            }
            return None;
        }

        // Binary search for the bracketing pair.
        let slice = buffer.as_slices();
        let find = |entries: &[Timestamped<Pose2D>]| -> Option<Pose2D> {
            match entries.binary_search_by(|e| e.timestamp_us.cmp(&stamp)) {
                Ok(i) => Some(entries[i].data),
                Err(i) if i > 0 && i < entries.len() => {
                    Pose2D::interpolate(&entries[i - 1], &entries[i], stamp)
                }
                Err(_) => None,
            }
        };
        if let Some(pose) = find(slice.0) {
            return Some(pose);
        }
        if let Some(pose) = find(slice.1) {
            return Some(pose);
        }
        // The stamp falls in the gap between the two slices.
        let left = slice.0.last()?;
        let right = slice.1.first()?;
        Pose2D::interpolate(left, right, stamp)
    }
}
