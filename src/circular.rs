//! # Circular Statistics
//!
//! Summaries for directional data such as headings from [`geodesy::bearing`].
//! Angles wrap, so the arithmetic mean of 350° and 10° is 180° while the
//! circular mean is 0°.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`circular_mean`] / [`circular_mean_degrees`] | Direction of the summed unit vectors |
//! | [`mean_resultant_length`] | Length `R` of the mean unit vector, in `[0, 1]` |
//! | [`circular_variance`] / [`circular_std_dev`] | Spread derived from `R` |
//! | [`circular_concentration`] | Von Mises `κ` estimate from `R` |
//! | [`circular_entropy`] | Shannon entropy of binned direction counts, in bits |
//! | [`angular_difference`] / [`angular_difference_degrees`] | Signed shortest turn between two angles |
//! | [`is_circular_uniform`] | Rayleigh test at the 5% level |
//!
//! Weights are optional. A weight list shorter than the angle list gives the
//! remaining angles a weight of 1.
//!
//! ## Example
//!
//! ```rust
//! use footprint_spatial::{circular, geodesy, GpsPoint};
//!
//! let origin = GpsPoint::new(37.8324, 112.5503);
//! let headings: Vec<f64> = [(37.90, 112.54), (37.90, 112.56)]
//!     .iter()
//!     .map(|&(lat, lng)| geodesy::bearing(&origin, &GpsPoint::new(lat, lng)))
//!     .collect();
//!
//! // One target slightly west of north, one slightly east.
//! let mean = circular::circular_mean_degrees(&headings, None);
//! assert!(mean < 10.0 || mean > 350.0);
//! ```
//!
//! [`geodesy::bearing`]: crate::geodesy::bearing

use std::f64::consts::PI;

/// Rayleigh p-value above which [`is_circular_uniform`] accepts uniformity.
pub const UNIFORMITY_P_VALUE: f64 = 0.05;

fn weight_at(weights: Option<&[f64]>, i: usize) -> f64 {
    weights.and_then(|w| w.get(i)).copied().unwrap_or(1.0)
}

/// Weighted sums of sines and cosines, plus the total weight.
fn resultant(angles: &[f64], weights: Option<&[f64]>) -> (f64, f64, f64) {
    angles
        .iter()
        .enumerate()
        .fold((0.0, 0.0, 0.0), |(sin, cos, total), (i, &angle)| {
            let w = weight_at(weights, i);
            (sin + w * angle.sin(), cos + w * angle.cos(), total + w)
        })
}

/// Mean direction of `angles` (radians), in `(-π, π]`. `0.0` for no angles.
pub fn circular_mean(angles: &[f64], weights: Option<&[f64]>) -> f64 {
    if angles.is_empty() {
        return 0.0;
    }
    let (sin, cos, _) = resultant(angles, weights);
    sin.atan2(cos)
}

/// Mean direction of `angles` given in degrees, in `[0, 360)`.
pub fn circular_mean_degrees(angles: &[f64], weights: Option<&[f64]>) -> f64 {
    let radians: Vec<f64> = angles.iter().map(|a| a.to_radians()).collect();
    let mean = circular_mean(&radians, weights).to_degrees();
    if mean < 0.0 {
        mean + 360.0
    } else {
        mean
    }
}

/// Mean resultant length `R`: 1 when every angle agrees, near 0 when they
/// cancel out. `0.0` for no angles or a zero total weight.
pub fn mean_resultant_length(angles: &[f64], weights: Option<&[f64]>) -> f64 {
    if angles.is_empty() {
        return 0.0;
    }
    let (sin, cos, total) = resultant(angles, weights);
    if total == 0.0 {
        return 0.0;
    }
    sin.hypot(cos) / total
}

/// `1 - R`.
pub fn circular_variance(angles: &[f64], weights: Option<&[f64]>) -> f64 {
    1.0 - mean_resultant_length(angles, weights)
}

/// `sqrt(-2 ln R)` in radians. Infinite when `R` is 0.
pub fn circular_std_dev(angles: &[f64], weights: Option<&[f64]>) -> f64 {
    let r = mean_resultant_length(angles, weights).min(1.0);
    (-2.0 * r.ln()).max(0.0).sqrt()
}

/// Approximate von Mises concentration `κ` for the sample.
///
/// Uses the piecewise estimate from Fisher's *Statistical Analysis of
/// Circular Data*. Grows without bound as `R` approaches 1.
pub fn circular_concentration(angles: &[f64], weights: Option<&[f64]>) -> f64 {
    let r = mean_resultant_length(angles, weights);
    if r < 0.53 {
        2.0 * r + r.powi(3) + 5.0 * r.powi(5) / 6.0
    } else if r < 0.85 {
        -0.4 + 1.39 * r + 0.43 / (1.0 - r)
    } else {
        1.0 / (r.powi(3) - 4.0 * r * r + 3.0 * r)
    }
}

/// Shannon entropy in bits of direction bin counts. Zero bins are skipped.
pub fn circular_entropy(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|&&w| w > 0.0)
        .map(|&w| {
            let p = w / total;
            -p * p.log2()
        })
        .sum()
}

/// Signed turn from `from` to `to`, in radians within `[-π, π]`.
pub fn angular_difference(from: f64, to: f64) -> f64 {
    wrap_difference(to - from, PI)
}

/// Signed turn from `from` to `to`, in degrees within `[-180, 180]`.
pub fn angular_difference_degrees(from: f64, to: f64) -> f64 {
    wrap_difference(to - from, 180.0)
}

/// Brings `diff` into range by whole turns. A positive overshoot lands on
/// `+half_turn` and a negative one on `-half_turn`.
fn wrap_difference(diff: f64, half_turn: f64) -> f64 {
    if (-half_turn..=half_turn).contains(&diff) {
        return diff;
    }
    let wrapped = (diff + half_turn).rem_euclid(2.0 * half_turn) - half_turn;
    if diff > 0.0 && wrapped == -half_turn {
        half_turn
    } else {
        wrapped
    }
}

/// Rayleigh test: `true` when the angles (radians) give no evidence of a
/// preferred direction at the 5% level.
///
/// The p-value is the large-sample approximation `exp(-n R²)`.
pub fn is_circular_uniform(angles: &[f64]) -> bool {
    let r = mean_resultant_length(angles, None);
    let z = angles.len() as f64 * r * r;
    (-z).exp() > UNIFORMITY_P_VALUE
}
