//! Saved-pose YAML persistence.
//!
//! The canonical schema mirrors a stamped pose-with-covariance message:
//!
//! ```yaml
//! header:
//!   frame_id: map
//!   stamp: {sec: 12, nsec: 340000000}
//! pose:
//!   pose:
//!     position: {x: 1.0, y: 2.0, z: 0.0}
//!     orientation: {x: 0.0, y: 0.0, z: 0.479, w: 0.877}
//!   covariance: [36 doubles]
//! ```
//!
//! Writes are atomic: the file is written next to its destination and
//! renamed over it, so a crash mid-write never leaves a torn pose behind.
//! A legacy layout with a top-level `state:` key (emitted by an older
//! serializer) is recognized on read and translated to this schema.

use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::types::{
    Pose2D, COVARIANCE_6X6_LEN, COVARIANCE_INDEX_AA, COVARIANCE_INDEX_XX, COVARIANCE_INDEX_YY,
};
use crate::error::{AmclError, Result};

/// Message-style timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stamp {
    pub sec: u64,
    pub nsec: u32,
}

impl Stamp {
    /// Convert from microseconds.
    pub fn from_micros(timestamp_us: u64) -> Self {
        Self {
            sec: timestamp_us / 1_000_000,
            nsec: ((timestamp_us % 1_000_000) * 1000) as u32,
        }
    }

    /// Convert back to microseconds.
    pub fn as_micros(&self) -> u64 {
        self.sec * 1_000_000 + (self.nsec / 1000) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub frame_id: String,
    #[serde(default)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseValue {
    pub position: Position,
    pub orientation: Orientation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseWithCovarianceValue {
    pub pose: PoseValue,
    /// Row-major 6×6 covariance.
    pub covariance: Vec<f64>,
}

/// A stamped map-frame pose with covariance, as persisted to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPose {
    pub header: Header,
    pub pose: PoseWithCovarianceValue,
}

impl SavedPose {
    /// Build a saved pose from the filter estimate.
    pub fn from_estimate(
        frame_id: &str,
        timestamp_us: u64,
        pose: &Pose2D,
        covariance: &[f64; COVARIANCE_6X6_LEN],
    ) -> Self {
        let half = pose.theta / 2.0;
        Self {
            header: Header {
                frame_id: frame_id.to_string(),
                stamp: Stamp::from_micros(timestamp_us),
            },
            pose: PoseWithCovarianceValue {
                pose: PoseValue {
                    position: Position {
                        x: pose.x,
                        y: pose.y,
                        z: 0.0,
                    },
                    orientation: Orientation {
                        x: 0.0,
                        y: 0.0,
                        z: half.sin(),
                        w: half.cos(),
                    },
                },
                covariance: covariance.to_vec(),
            },
        }
    }

    /// Planar pose encoded in this record.
    pub fn pose2d(&self) -> Pose2D {
        let q = &self.pose.pose.orientation;
        Pose2D::new(
            self.pose.pose.position.x,
            self.pose.pose.position.y,
            2.0 * q.z.atan2(q.w),
        )
    }

    /// The (xx, yy, aa) variances, zero-filled if the list is short.
    pub fn planar_variances(&self) -> (f64, f64, f64) {
        let get = |i: usize| self.pose.covariance.get(i).copied().unwrap_or(0.0);
        (
            get(COVARIANCE_INDEX_XX),
            get(COVARIANCE_INDEX_YY),
            get(COVARIANCE_INDEX_AA),
        )
    }

    /// Whether the pose and planar variances parse to finite numbers.
    pub fn is_finite(&self) -> bool {
        let (xx, yy, aa) = self.planar_variances();
        self.pose2d().is_finite() && xx.is_finite() && yy.is_finite() && aa.is_finite()
    }
}

/// Atomically write the pose record to `path`.
pub fn save_pose_file<P: AsRef<Path>>(path: P, pose: &SavedPose) -> Result<()> {
    let path = path.as_ref();
    let text = serde_yaml::to_string(pose)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a pose record, accepting both the canonical and the legacy layout.
pub fn load_pose_file<P: AsRef<Path>>(path: P) -> Result<SavedPose> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text)?;

    let first_key = value
        .as_mapping()
        .and_then(|m| m.keys().next())
        .and_then(|k| k.as_str())
        .unwrap_or("");

    match first_key {
        "header" | "pose" => {
            debug!("saved pose in canonical layout");
            Ok(serde_yaml::from_value(value)?)
        }
        "state" => {
            debug!("saved pose in legacy layout; translating");
            translate_legacy(&value)
        }
        other => Err(AmclError::Parse(format!(
            "saved pose file has unrecognized top-level key \"{other}\""
        ))),
    }
}

/// Translate the legacy nested-`state` serialization.
///
/// The legacy writer dumped its message object graph as alternating
/// `state` lists: `state[0].state[2]` holds the frame id,
/// `state[1].state[0]` the pose (position list, orientation list) and
/// `state[1].state[1]` the flat covariance.
fn translate_legacy(value: &serde_yaml::Value) -> Result<SavedPose> {
    let get = |v: &serde_yaml::Value, idx: usize| -> Result<serde_yaml::Value> {
        v.get("state")
            .and_then(|s| s.get(idx))
            .cloned()
            .ok_or_else(|| AmclError::Parse(format!("legacy pose: missing state[{idx}]")))
    };
    let number = |v: &serde_yaml::Value, ctx: &str| -> Result<f64> {
        v.as_f64()
            .ok_or_else(|| AmclError::Parse(format!("legacy pose: {ctx} is not a number")))
    };

    let header = get(value, 0)?;
    let frame_id = header
        .get("state")
        .and_then(|s| s.get(2))
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| {
            warn!("legacy pose: missing frame id; assuming map");
            "map"
        })
        .to_string();

    let body = get(value, 1)?;
    let pose_pair = get(&body, 0)?;
    let position = get(&pose_pair, 0)?;
    let orientation = get(&pose_pair, 1)?;

    let pos = position
        .get("state")
        .cloned()
        .ok_or_else(|| AmclError::Parse("legacy pose: missing position state".to_string()))?;
    let ori = orientation
        .get("state")
        .cloned()
        .ok_or_else(|| AmclError::Parse("legacy pose: missing orientation state".to_string()))?;

    let x = number(pos.get(0).unwrap_or(&serde_yaml::Value::Null), "position x")?;
    let y = number(pos.get(1).unwrap_or(&serde_yaml::Value::Null), "position y")?;
    let qz = number(ori.get(2).unwrap_or(&serde_yaml::Value::Null), "orientation z")?;
    let qw = number(ori.get(3).unwrap_or(&serde_yaml::Value::Null), "orientation w")?;

    let covariance_value = get(&body, 1)?;
    let mut covariance = vec![0.0; COVARIANCE_6X6_LEN];
    if let Some(list) = covariance_value.as_sequence() {
        for (i, entry) in list.iter().take(COVARIANCE_6X6_LEN).enumerate() {
            covariance[i] = entry.as_f64().unwrap_or(0.0);
        }
    }

    Ok(SavedPose {
        header: Header {
            frame_id,
            stamp: Stamp::default(),
        },
        pose: PoseWithCovarianceValue {
            pose: PoseValue {
                position: Position { x, y, z: 0.0 },
                orientation: Orientation {
                    x: 0.0,
                    y: 0.0,
                    z: qz,
                    w: qw,
                },
            },
            covariance,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::covariance_3x3_to_6x6;
    use crate::core::types::Covariance3;

    fn sample_pose() -> SavedPose {
        let cov = covariance_3x3_to_6x6(&Covariance3::diagonal(0.25, 0.16, 0.068));
        SavedPose::from_estimate("map", 12_340_000, &Pose2D::new(1.5, -2.25, 0.75), &cov)
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("savedpose.yaml");
        let saved = sample_pose();
        save_pose_file(&path, &saved).unwrap();
        let loaded = load_pose_file(&path).unwrap();

        // Position and covariance survive exactly; the heading passes
        // through a quaternion so it gets a numeric tolerance.
        assert_eq!(loaded.pose.pose.position.x, 1.5);
        assert_eq!(loaded.pose.pose.position.y, -2.25);
        let (xx, yy, aa) = loaded.planar_variances();
        assert_eq!(xx, 0.25);
        assert_eq!(yy, 0.16);
        assert_eq!(aa, 0.068);
        assert!((loaded.pose2d().theta - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_save_overwrites_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("savedpose.yaml");
        save_pose_file(&path, &sample_pose()).unwrap();

        let cov = covariance_3x3_to_6x6(&Covariance3::diagonal(0.01, 0.01, 0.01));
        let newer = SavedPose::from_estimate("map", 99, &Pose2D::new(7.0, 8.0, -1.0), &cov);
        save_pose_file(&path, &newer).unwrap();

        let loaded = load_pose_file(&path).unwrap();
        assert_eq!(loaded.pose.pose.position.x, 7.0);
    }

    #[test]
    fn test_stamp_micros_roundtrip() {
        let stamp = Stamp::from_micros(12_345_678);
        assert_eq!(stamp.sec, 12);
        assert_eq!(stamp.nsec, 345_678_000);
        assert_eq!(stamp.as_micros(), 12_345_678);
    }

    #[test]
    fn test_legacy_state_layout_translates() {
        let legacy = r#"
state:
  - state: [header, 0, map]
  - state:
      - state:
          - state: [3.5, -1.25, 0.0]
          - state: [0.0, 0.0, 0.3894183423086505, 0.9210609940028851]
      - [0.09, 0.0, 0.0, 0.0, 0.0, 0.0,
         0.0, 0.04, 0.0, 0.0, 0.0, 0.0,
         0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
         0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
         0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
         0.0, 0.0, 0.0, 0.0, 0.0, 0.0625]
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.yaml");
        std::fs::write(&path, legacy).unwrap();

        let loaded = load_pose_file(&path).unwrap();
        assert_eq!(loaded.header.frame_id, "map");
        assert_eq!(loaded.pose.pose.position.x, 3.5);
        let (xx, yy, aa) = loaded.planar_variances();
        assert_eq!(xx, 0.09);
        assert_eq!(yy, 0.04);
        assert_eq!(aa, 0.0625);
        // sin/cos of 0.4 encoded above.
        assert!((loaded.pose2d().theta - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_unrecognized_layout_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.yaml");
        std::fs::write(&path, "surprise: 42\n").unwrap();
        assert!(load_pose_file(&path).is_err());
    }

    #[test]
    fn test_nan_detection() {
        let cov = covariance_3x3_to_6x6(&Covariance3::diagonal(f64::NAN, 0.1, 0.1));
        let saved = SavedPose::from_estimate("map", 0, &Pose2D::identity(), &cov);
        assert!(!saved.is_finite());
        assert!(sample_pose().is_finite());
    }
}
