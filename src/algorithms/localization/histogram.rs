//! Sparse pose histogram for KLD sizing and cluster labeling.
//!
//! Poses are discretized into (x, y, yaw) bins held in a hash map. The
//! number of occupied bins drives the KLD sample-count bound during
//! resampling, and flood-filling connected bins afterwards yields the
//! cluster labels the statistics pass groups samples by.

use std::collections::HashMap;

use crate::core::types::Pose2D;

/// Bin key: discretized (x, y, yaw).
pub type BinKey = (i32, i32, i32);

/// Sparse histogram over discretized pose space. Reset at each resample.
#[derive(Debug, Clone)]
pub struct PoseHistogram {
    size_x: f64,
    size_y: f64,
    size_yaw: f64,
    /// Occupied bins and their cluster label (None before clustering).
    bins: HashMap<BinKey, Option<u32>>,
    cluster_count: u32,
}

impl PoseHistogram {
    /// Histogram with the given bin edge lengths.
    pub fn new(size_x: f64, size_y: f64, size_yaw: f64) -> Self {
        Self {
            size_x,
            size_y,
            size_yaw,
            bins: HashMap::new(),
            cluster_count: 0,
        }
    }

    /// Reference bin sizes: 0.5 m × 0.5 m × 10°.
    pub fn with_reference_bins() -> Self {
        Self::new(0.5, 0.5, 10.0f64.to_radians())
    }

    /// Discretize a pose into its bin key.
    #[inline]
    pub fn key_of(&self, pose: &Pose2D) -> BinKey {
        (
            (pose.x / self.size_x).floor() as i32,
            (pose.y / self.size_y).floor() as i32,
            (pose.theta / self.size_yaw).floor() as i32,
        )
    }

    /// Drop all bins and labels.
    pub fn clear(&mut self) {
        self.bins.clear();
        self.cluster_count = 0;
    }

    /// Mark the bin containing `pose` occupied.
    pub fn insert(&mut self, pose: &Pose2D) {
        self.bins.insert(self.key_of(pose), None);
    }

    /// Number of occupied bins (the `k` of the KLD bound).
    pub fn occupied_bins(&self) -> usize {
        self.bins.len()
    }

    /// Number of clusters found by the last [`PoseHistogram::cluster`] run.
    pub fn cluster_count(&self) -> usize {
        self.cluster_count as usize
    }

    /// Cluster label of the bin containing `pose`, if labeled.
    pub fn cluster_of(&self, pose: &Pose2D) -> Option<u32> {
        self.bins.get(&self.key_of(pose)).copied().flatten()
    }

    /// Label connected occupied bins with cluster ids.
    ///
    /// Bins are connected when every key component differs by at most one;
    /// a depth-first flood fill assigns ids in encounter order.
    pub fn cluster(&mut self) {
        for label in self.bins.values_mut() {
            *label = None;
        }
        self.cluster_count = 0;

        let keys: Vec<BinKey> = self.bins.keys().copied().collect();
        let mut stack: Vec<BinKey> = Vec::new();
        for key in keys {
            if self.bins[&key].is_some() {
                continue;
            }
            let id = self.cluster_count;
            self.cluster_count += 1;

            stack.push(key);
            self.bins.insert(key, Some(id));
            while let Some((kx, ky, kt)) = stack.pop() {
                for dx in -1..=1 {
                    for dy in -1..=1 {
                        for dt in -1..=1 {
                            let neighbor = (kx + dx, ky + dy, kt + dt);
                            if let Some(label) = self.bins.get_mut(&neighbor) {
                                if label.is_none() {
                                    *label = Some(id);
                                    stack.push(neighbor);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_counts_distinct_bins() {
        let mut h = PoseHistogram::with_reference_bins();
        h.insert(&Pose2D::new(0.1, 0.1, 0.0));
        h.insert(&Pose2D::new(0.2, 0.2, 0.0)); // same bin
        h.insert(&Pose2D::new(0.7, 0.1, 0.0)); // new x bin
        h.insert(&Pose2D::new(0.1, 0.1, 0.5)); // new yaw bin
        assert_eq!(h.occupied_bins(), 3);
    }

    #[test]
    fn test_clear_resets() {
        let mut h = PoseHistogram::with_reference_bins();
        h.insert(&Pose2D::identity());
        h.clear();
        assert_eq!(h.occupied_bins(), 0);
    }

    #[test]
    fn test_adjacent_bins_form_one_cluster() {
        let mut h = PoseHistogram::with_reference_bins();
        h.insert(&Pose2D::new(0.1, 0.1, 0.0));
        h.insert(&Pose2D::new(0.7, 0.1, 0.0));
        h.insert(&Pose2D::new(1.2, 0.1, 0.0));
        h.cluster();
        assert_eq!(h.cluster_count(), 1);
        assert_eq!(h.cluster_of(&Pose2D::new(0.1, 0.1, 0.0)), Some(0));
        assert_eq!(h.cluster_of(&Pose2D::new(1.2, 0.1, 0.0)), Some(0));
    }

    #[test]
    fn test_separated_bins_form_two_clusters() {
        let mut h = PoseHistogram::with_reference_bins();
        h.insert(&Pose2D::new(0.1, 0.1, 0.0));
        h.insert(&Pose2D::new(5.0, 5.0, 0.0));
        h.cluster();
        assert_eq!(h.cluster_count(), 2);
        let a = h.cluster_of(&Pose2D::new(0.1, 0.1, 0.0));
        let b = h.cluster_of(&Pose2D::new(5.0, 5.0, 0.0));
        assert!(a.is_some() && b.is_some());
        assert_ne!(a, b);
    }

    #[test]
    fn test_diagonal_adjacency_connects() {
        let mut h = PoseHistogram::with_reference_bins();
        h.insert(&Pose2D::new(0.1, 0.1, 0.0));
        h.insert(&Pose2D::new(0.7, 0.7, 0.1));
        h.cluster();
        assert_eq!(h.cluster_count(), 1);
    }

    #[test]
    fn test_unlabeled_pose_has_no_cluster() {
        let mut h = PoseHistogram::with_reference_bins();
        h.insert(&Pose2D::identity());
        h.cluster();
        assert_eq!(h.cluster_of(&Pose2D::new(9.0, 9.0, 0.0)), None);
    }
}
