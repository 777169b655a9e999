//! Angle arithmetic and noise sampling primitives.
//!
//! All filter math runs in `f64`; angles are radians canonicalized to
//! (−π, π].

use rand::Rng;

/// Canonicalize an angle to (−π, π].
///
/// Uses the `atan2(sin, cos)` form so the result is exact at the branch
/// cut regardless of how far out of range the input is.
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    angle.sin().atan2(angle.cos())
}

/// Signed shortest rotation that takes angle `b` onto angle `a`.
///
/// Both inputs are normalized first; the result is in [−π, π] and
/// antisymmetric: `angle_diff(a, b) == -angle_diff(b, a)`.
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let a = normalize_angle(a);
    let b = normalize_angle(b);
    let d1 = a - b;
    let mut d2 = 2.0 * std::f64::consts::PI - d1.abs();
    if d1 > 0.0 {
        d2 = -d2;
    }
    if d1.abs() < d2.abs() {
        d1
    } else {
        d2
    }
}

/// Draw from a zero-mean Gaussian with the given standard deviation.
///
/// Sum-of-twelve-uniforms: twelve U(0,1) draws summed and centered give a
/// variate with unit variance, scaled by `sigma`. A non-positive `sigma`
/// returns exactly 0, which keeps noise-free motion models deterministic.
pub fn gaussian_sample<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return 0.0;
    }
    let mut sum = 0.0;
    for _ in 0..12 {
        sum += rng.gen::<f64>();
    }
    sigma * (sum - 6.0)
}

/// Interpolate between two angles along the shortest arc.
///
/// `t` in [0, 1] maps `a` to `b`.
#[inline]
pub fn angle_lerp(a: f64, b: f64, t: f64) -> f64 {
    normalize_angle(a - angle_diff(a, b) * t)
}
