//! Monte Carlo localization: particle filter, motion and sensor models.

mod histogram;
mod motion_model;
mod particle_filter;
mod point_cloud_model;
mod sensor_model;

pub use histogram::PoseHistogram;
pub use motion_model::{MotionModel, OdomModelKind};
pub use particle_filter::{Cluster, ParticleFilter, ResampleModelKind, Sample, SampleSet};
pub use point_cloud_model::{PointCloudModel, PointCloudModelParams};
pub use sensor_model::{BeamAggregation, LaserModelParams, LikelihoodFieldModel, MapFactors};
