//! Adaptive particle filter with KLD-sized resampling.
//!
//! Two sample sets are kept: the live one and a scratch buffer the
//! resampler fills; their roles swap atomically when a resample commits.
//! The number of samples drawn adapts to how many pose-histogram bins the
//! new set occupies (KLD sampling), and a pair of exponentially-weighted
//! averages of the mean weight drives uniform re-injection when the filter
//! starts tracking poorly.

use log::warn;
use rand::Rng;

use crate::core::eig3::eigen_decomposition;
use crate::core::math::gaussian_sample;
use crate::core::types::{Covariance3, Pose2D};

use super::histogram::PoseHistogram;

/// One pose hypothesis and its importance weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Hypothesized robot pose.
    pub pose: Pose2D,
    /// Nonnegative importance weight; a live set sums to 1.
    pub weight: f64,
}

/// Statistics for one connected cluster of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    /// Total weight of member samples.
    pub weight: f64,
    /// Weighted mean pose; yaw from circular moments.
    pub mean: Pose2D,
    /// Weighted covariance; yaw entry is the circular variance.
    pub cov: Covariance3,
    /// Number of member samples.
    pub count: usize,
}

/// How ancestors are drawn during resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResampleModelKind {
    /// Independent uniform draws, binary search over the CDF.
    #[default]
    Multinomial,
    /// One uniform offset plus a fixed stride.
    Systematic,
}

impl ResampleModelKind {
    /// Parse a configuration string, falling back to `multinomial` with a
    /// warning on anything unrecognized.
    pub fn parse(value: &str) -> Self {
        match value {
            "multinomial" => ResampleModelKind::Multinomial,
            "systematic" => ResampleModelKind::Systematic,
            other => {
                warn!("unknown resample model type \"{other}\"; defaulting to multinomial model");
                ResampleModelKind::Multinomial
            }
        }
    }

    /// Canonical configuration string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResampleModelKind::Multinomial => "multinomial",
            ResampleModelKind::Systematic => "systematic",
        }
    }
}

/// One of the two sample buffers.
#[derive(Debug, Clone)]
pub struct SampleSet {
    samples: Vec<Sample>,
    histogram: PoseHistogram,
    clusters: Vec<Cluster>,
    mean: Pose2D,
    cov: Covariance3,
    converged: bool,
}

impl SampleSet {
    fn new() -> Self {
        Self {
            samples: Vec::new(),
            histogram: PoseHistogram::with_reference_bins(),
            clusters: Vec::new(),
            mean: Pose2D::identity(),
            cov: Covariance3::zeros(),
            converged: false,
        }
    }

    /// The samples, in draw order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Clusters from the last statistics pass, unordered.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Whole-set weighted mean pose.
    pub fn mean(&self) -> Pose2D {
        self.mean
    }

    /// Whole-set weighted covariance.
    pub fn cov(&self) -> Covariance3 {
        self.cov
    }

    /// Whether the set has collapsed tightly enough to count as converged.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Highest-weight cluster, if any cluster carries weight.
    pub fn best_cluster(&self) -> Option<&Cluster> {
        self.clusters
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }
}

/// Adaptive Monte Carlo particle filter.
#[derive(Debug)]
pub struct ParticleFilter {
    min_samples: usize,
    max_samples: usize,
    /// KLD population error bound ε.
    pop_err: f64,
    /// KLD upper quantile z_p.
    pop_z: f64,
    resample_model: ResampleModelKind,
    /// Running averages of the mean sample weight.
    w_slow: f64,
    w_fast: f64,
    /// Decay rates for the running averages.
    alpha_slow: f64,
    alpha_fast: f64,
    /// Weighted-std threshold on x and y for the convergence flag.
    convergence_std: f64,
    sets: [SampleSet; 2],
    current: usize,
}

impl ParticleFilter {
    /// Create a filter with the given population bounds and decay rates.
    ///
    /// A `min_samples` above `max_samples` is clamped with a warning rather
    /// than rejected; a misconfigured filter that runs beats one that
    /// refuses to start.
    pub fn new(min_samples: usize, max_samples: usize, alpha_slow: f64, alpha_fast: f64) -> Self {
        let min_samples = min_samples.max(1);
        let (min_samples, max_samples) = if min_samples > max_samples {
            warn!(
                "min_particles {min_samples} exceeds max_particles {max_samples}; clamping to equal"
            );
            (min_samples, min_samples)
        } else {
            (min_samples, max_samples)
        };
        Self {
            min_samples,
            max_samples,
            pop_err: 0.01,
            pop_z: 0.99,
            resample_model: ResampleModelKind::Multinomial,
            w_slow: 0.0,
            w_fast: 0.0,
            alpha_slow,
            alpha_fast,
            convergence_std: 0.05,
            sets: [SampleSet::new(), SampleSet::new()],
            current: 0,
        }
    }

    /// Set the KLD bound parameters (ε, z_p).
    pub fn set_population_size_parameters(&mut self, err: f64, z: f64) {
        self.pop_err = err;
        self.pop_z = z;
    }

    /// Select the ancestor-draw scheme.
    pub fn set_resample_model(&mut self, model: ResampleModelKind) {
        self.resample_model = model;
    }

    /// Set the recovery decay rates (α_slow, α_fast).
    pub fn set_decay_rates(&mut self, alpha_slow: f64, alpha_fast: f64) {
        self.alpha_slow = alpha_slow;
        self.alpha_fast = alpha_fast;
    }

    /// Set the weighted-std threshold under which the set counts as
    /// converged.
    pub fn set_convergence_threshold(&mut self, std_xy: f64) {
        self.convergence_std = std_xy;
    }

    /// Population floor.
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Population ceiling.
    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    /// Current recovery averages (w_slow, w_fast).
    pub fn recovery_averages(&self) -> (f64, f64) {
        (self.w_slow, self.w_fast)
    }

    /// The live sample set.
    pub fn current_set(&self) -> &SampleSet {
        &self.sets[self.current]
    }

    /// Mutable samples of the live set, for motion and sensor updates.
    pub fn current_samples_mut(&mut self) -> &mut [Sample] {
        &mut self.sets[self.current].samples
    }

    /// Whether the live set has converged.
    pub fn converged(&self) -> bool {
        self.sets[self.current].converged
    }

    /// Initialize with `min_samples` draws from a Gaussian pose prior.
    ///
    /// The covariance is factored through its eigendecomposition so
    /// correlated priors sample correctly; yaw draws are re-normalized.
    pub fn init<R: Rng + ?Sized>(&mut self, mean: Pose2D, cov: Covariance3, rng: &mut R) {
        let (d, v) = eigen_decomposition(&cov.m);
        // Eigenvalues of a PSD covariance can come out at -1e-18 from
        // rounding; treat them as zero.
        let sigmas = [
            d[0].max(0.0).sqrt(),
            d[1].max(0.0).sqrt(),
            d[2].max(0.0).sqrt(),
        ];

        let n = self.min_samples;
        let set = &mut self.sets[self.current];
        set.samples.clear();
        for _ in 0..n {
            let z = [
                gaussian_sample(rng, sigmas[0]),
                gaussian_sample(rng, sigmas[1]),
                gaussian_sample(rng, sigmas[2]),
            ];
            let pose = Pose2D::new(
                mean.x + v[0][0] * z[0] + v[0][1] * z[1] + v[0][2] * z[2],
                mean.y + v[1][0] * z[0] + v[1][1] * z[1] + v[1][2] * z[2],
                mean.theta + v[2][0] * z[0] + v[2][1] * z[1] + v[2][2] * z[2],
            );
            set.samples.push(Sample {
                pose,
                weight: 1.0 / n as f64,
            });
        }

        self.w_slow = 0.0;
        self.w_fast = 0.0;
        self.compute_cluster_stats();
        self.sets[self.current].converged = false;
    }

    /// Initialize with `min_samples` poses from a generator function, used
    /// for global localization with a uniform-in-free-space generator.
    pub fn init_model(&mut self, mut pose_fn: impl FnMut() -> Pose2D) {
        let n = self.min_samples;
        let set = &mut self.sets[self.current];
        set.samples.clear();
        for _ in 0..n {
            set.samples.push(Sample {
                pose: pose_fn(),
                weight: 1.0 / n as f64,
            });
        }

        self.w_slow = 0.0;
        self.w_fast = 0.0;
        self.compute_cluster_stats();
        self.sets[self.current].converged = false;
    }

    /// Run an observation pass over the live samples and renormalize.
    ///
    /// `observe` multiplies sample weights in place and returns the new
    /// total. A vanished total re-seeds uniform weights and resets the
    /// recovery averages; the filter stays usable.
    pub fn update_observation(&mut self, observe: impl FnOnce(&mut [Sample]) -> f64) {
        let set = &mut self.sets[self.current];
        let total = observe(&mut set.samples);
        let n = set.samples.len();
        if n == 0 {
            return;
        }

        if total > 0.0 {
            for sample in &mut set.samples {
                sample.weight /= total;
            }
            let w_avg = total / n as f64;
            if self.w_slow == 0.0 {
                self.w_slow = w_avg;
            } else {
                self.w_slow += self.alpha_slow * (w_avg - self.w_slow);
            }
            if self.w_fast == 0.0 {
                self.w_fast = w_avg;
            } else {
                self.w_fast += self.alpha_fast * (w_avg - self.w_fast);
            }
        } else {
            warn!("observation zeroed all sample weights; re-seeding uniform");
            let uniform = 1.0 / n as f64;
            for sample in &mut set.samples {
                sample.weight = uniform;
            }
            self.w_slow = 0.0;
            self.w_fast = 0.0;
        }
    }

    /// KLD bound on the number of samples needed for `k` occupied bins,
    /// clamped to the configured population range.
    pub fn resample_limit(&self, k: usize) -> usize {
        Self::kld_limit(
            k,
            self.pop_err,
            self.pop_z,
            self.min_samples,
            self.max_samples,
        )
    }

    fn kld_limit(k: usize, pop_err: f64, pop_z: f64, min: usize, max: usize) -> usize {
        if k <= 1 {
            return min;
        }
        let k1 = (k - 1) as f64;
        let b = 2.0 / (9.0 * k1);
        let x = 1.0 - b + b.sqrt() * pop_z;
        let n = (k1 / (2.0 * pop_err) * x * x * x).ceil() as usize;
        n.clamp(min, max)
    }

    /// Resample into the scratch buffer, swap it live, and recompute
    /// cluster statistics.
    ///
    /// With probability `max(0, 1 − w_fast/w_slow)` each draw takes a pose
    /// from `random_pose` instead of an ancestor; drawing stops once the
    /// KLD bound for the occupied-bin count is met.
    pub fn update_resample<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        mut random_pose: Option<&mut dyn FnMut(&mut R) -> Pose2D>,
    ) {
        let w_diff = if self.w_slow > 0.0 {
            (1.0 - self.w_fast / self.w_slow).max(0.0)
        } else {
            0.0
        };

        let (pop_err, pop_z) = (self.pop_err, self.pop_z);
        let (min_samples, max_samples) = (self.min_samples, self.max_samples);
        let resample_model = self.resample_model;

        let (left, right) = self.sets.split_at_mut(1);
        let (cur, next) = if self.current == 0 {
            (&mut left[0], &mut right[0])
        } else {
            (&mut right[0], &mut left[0])
        };

        if cur.samples.is_empty() {
            return;
        }

        // Cumulative distribution over the current weights; normalized
        // defensively in case an update path skipped it.
        let mut cdf = Vec::with_capacity(cur.samples.len());
        let mut running = 0.0;
        for sample in &cur.samples {
            running += sample.weight;
            cdf.push(running);
        }
        let total = running;

        let select_ancestor = |r: f64, cdf: &[f64]| -> usize {
            let target = r * total;
            match cdf.binary_search_by(|c| c.total_cmp(&target)) {
                Ok(i) => i,
                Err(i) => i.min(cdf.len() - 1),
            }
        };

        next.samples.clear();
        next.histogram.clear();
        let mut drawn = 0usize;
        // The KLD bound is only known once poses have been drawn, so draw
        // in sweeps: each sweep tops the set up to the current bound, and a
        // systematic comb is strided over the sweep's own size so every
        // sweep spans the full [0, 1) of cumulative weight.
        let mut target = min_samples;
        loop {
            let sweep = target - drawn;
            let stride = 1.0 / sweep as f64;
            let offset = rng.gen::<f64>() * stride;

            for step in 0..sweep {
                let inject = w_diff > 0.0
                    && random_pose.is_some()
                    && rng.gen::<f64>() < w_diff;
                let pose = if inject {
                    (random_pose.as_mut().expect("checked above"))(&mut *rng)
                } else {
                    let r = match resample_model {
                        ResampleModelKind::Multinomial => rng.gen::<f64>(),
                        ResampleModelKind::Systematic => offset + step as f64 * stride,
                    };
                    cur.samples[select_ancestor(r, &cdf)].pose
                };

                next.samples.push(Sample { pose, weight: 1.0 });
                next.histogram.insert(&pose);
            }
            drawn = target;

            let limit = Self::kld_limit(
                next.histogram.occupied_bins(),
                pop_err,
                pop_z,
                min_samples,
                max_samples,
            );
            if drawn >= limit {
                break;
            }
            target = limit;
        }

        let uniform = 1.0 / drawn as f64;
        for sample in &mut next.samples {
            sample.weight = uniform;
        }

        // Injection happened (or was possible): reset the averages so the
        // filter does not oscillate between injecting and recovering.
        if w_diff > 0.0 {
            self.w_slow = 0.0;
            self.w_fast = 0.0;
        }

        self.current ^= 1;
        self.compute_cluster_stats();
    }

    /// Recompute cluster labels and weighted statistics for the live set,
    /// and refresh the convergence flag.
    pub fn compute_cluster_stats(&mut self) {
        let convergence_std = self.convergence_std;
        let set = &mut self.sets[self.current];

        // Rebuild the histogram from the live samples; callers may have
        // moved poses since the last insert pass.
        set.histogram.clear();
        for sample in &set.samples {
            set.histogram.insert(&sample.pose);
        }
        set.histogram.cluster();

        let cluster_count = set.histogram.cluster_count();
        #[derive(Clone, Copy, Default)]
        struct Accum {
            count: usize,
            weight: f64,
            m: [f64; 4],
            c: [[f64; 2]; 2],
        }
        impl Accum {
            fn add(&mut self, sample: &Sample) {
                let w = sample.weight;
                let p = &sample.pose;
                self.count += 1;
                self.weight += w;
                self.m[0] += w * p.x;
                self.m[1] += w * p.y;
                self.m[2] += w * p.theta.cos();
                self.m[3] += w * p.theta.sin();
                let xy = [p.x, p.y];
                for j in 0..2 {
                    for k in 0..2 {
                        self.c[j][k] += w * xy[j] * xy[k];
                    }
                }
            }

            fn finish(&self) -> Option<(Pose2D, Covariance3)> {
                if self.weight <= 0.0 {
                    return None;
                }
                let w = self.weight;
                let mean = Pose2D::new(self.m[0] / w, self.m[1] / w, self.m[3].atan2(self.m[2]));
                let mut cov = Covariance3::zeros();
                let mean_xy = [mean.x, mean.y];
                for j in 0..2 {
                    for k in 0..2 {
                        cov.m[j][k] = self.c[j][k] / w - mean_xy[j] * mean_xy[k];
                    }
                }
                // Circular variance of the heading: -2 ln R with R the
                // mean resultant length.
                let resultant =
                    ((self.m[2] * self.m[2] + self.m[3] * self.m[3]).sqrt() / w).min(1.0);
                cov.m[2][2] = if resultant > 0.0 {
                    -2.0 * resultant.ln()
                } else {
                    2.0 * std::f64::consts::PI * std::f64::consts::PI
                };
                Some((mean, cov))
            }
        }

        let mut cluster_acc = vec![Accum::default(); cluster_count];
        let mut set_acc = Accum::default();
        for sample in &set.samples {
            set_acc.add(sample);
            if let Some(id) = set.histogram.cluster_of(&sample.pose) {
                cluster_acc[id as usize].add(sample);
            }
        }

        set.clusters = cluster_acc
            .iter()
            .filter_map(|acc| {
                acc.finish().map(|(mean, cov)| Cluster {
                    weight: acc.weight,
                    mean,
                    cov,
                    count: acc.count,
                })
            })
            .collect();

        if let Some((mean, cov)) = set_acc.finish() {
            set.mean = mean;
            set.cov = cov;
            set.converged = cov.m[0][0].max(0.0).sqrt() < convergence_std
                && cov.m[1][1].max(0.0).sqrt() < convergence_std;
        } else {
            set.converged = false;
        }
    }
}
