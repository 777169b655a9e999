//! DhruvaAMCL: Adaptive Monte Carlo Localization.
//!
//! Probabilistic pose tracking for a planar robot on a known map: odometry
//! provides the motion prior, range sensing the measurement evidence, and a
//! KLD-adaptive particle filter the posterior over (x, y, yaw).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Update loop
//! │        (localizer, transform publisher)             │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │   (particle filter, motion & sensor models, maps)   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                 core/  io/  config/                 │  ← Foundation
//! │        (types, math, persistence, settings)         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The messaging layer, transform tree and map sources live outside this
//! crate; [`engine::Localizer`] is the callback surface they drive.

pub mod algorithms;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod io;

pub use algorithms::localization::{
    BeamAggregation, Cluster, LaserModelParams, LikelihoodFieldModel, MapFactors, MotionModel,
    OdomModelKind, ParticleFilter, PointCloudModel, PointCloudModelParams, PoseHistogram,
    ResampleModelKind, Sample, SampleSet,
};
pub use algorithms::mapping::{
    CachedDistanceMap, MapModel, OccState, OccupancyGridMsg, OccupancyMap, OctreeField,
    OctreeSummary,
};
pub use config::AmclConfig;
pub use self::core::math;
pub use self::core::types::{
    AbsoluteMotionIntegrator, Covariance3, OdomData, PlanarScan, PointCloudScan, Pose2D, ScanBeam,
    Timestamped,
};
pub use engine::{Localizer, PoseEstimate, ScanOutcome, TransformBroadcast, TransformPublisher};
pub use error::{AmclError, Result};
pub use io::{load_pose_file, save_pose_file, SavedPose};
