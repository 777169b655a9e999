//! Persistence infrastructure.

pub mod pose_file;

pub use pose_file::{load_pose_file, save_pose_file, SavedPose};
