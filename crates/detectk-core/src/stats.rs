//! Weighted statistics kernel.
//!
//! Pure numeric primitives with no knowledge of seasonality or detector
//! semantics: the detectors decide what the weights mean, this module
//! only interpolates.

use crate::error::{CoreError, Result};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Compute the weighted `percentile` (0-100) of `values` using `weights`.
///
/// `values` and `weights` must have equal, nonzero length; `weights` must
/// sum to 1 within `1e-9`; `percentile` must lie in `[0, 100]`.
///
/// Implemented as linear interpolation between adjacent cumulative-weight
/// brackets after sorting `(value, weight)` pairs by value. If the target
/// cumulative weight falls before the first bracket, returns the minimum;
/// beyond the last, the maximum; if two adjacent cumulative weights
/// coincide, returns the upper value rather than dividing by zero.
pub fn weighted_percentile(values: &[f64], weights: &[f64], percentile: f64) -> Result<f64> {
    if values.len() != weights.len() {
        return Err(CoreError::BadInput(format!(
            "values and weights must have the same length: {} vs {}",
            values.len(),
            weights.len()
        )));
    }
    if values.is_empty() {
        return Err(CoreError::BadInput(
            "values must not be empty".to_string(),
        ));
    }
    let weight_sum: f64 = weights.iter().sum();
    if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(CoreError::BadInput(format!(
            "weights must sum to 1.0, got {weight_sum}"
        )));
    }
    if !(0.0..=100.0).contains(&percentile) {
        return Err(CoreError::BadInput(format!(
            "percentile must be in [0, 100], got {percentile}"
        )));
    }

    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap());

    let sorted_values: Vec<f64> = order.iter().map(|&i| values[i]).collect();
    let sorted_weights: Vec<f64> = order.iter().map(|&i| weights[i]).collect();

    let target = percentile / 100.0;
    let mut cumulative = 0.0;
    let mut cumsum = Vec::with_capacity(sorted_weights.len());
    for w in &sorted_weights {
        cumulative += w;
        cumsum.push(cumulative);
    }

    // Index of the first bracket whose cumulative weight reaches the target.
    let idx = cumsum.partition_point(|&c| c < target);

    if idx == 0 {
        return Ok(sorted_values[0]);
    }
    if idx >= sorted_values.len() {
        return Ok(sorted_values[sorted_values.len() - 1]);
    }

    let lower_weight = cumsum[idx - 1];
    let upper_weight = cumsum[idx];
    if (upper_weight - lower_weight).abs() < f64::EPSILON {
        return Ok(sorted_values[idx]);
    }

    let fraction = (target - lower_weight) / (upper_weight - lower_weight);
    Ok(sorted_values[idx - 1] + fraction * (sorted_values[idx] - sorted_values[idx - 1]))
}

/// Unweighted `percentile` (0-100) of `values`, using linear interpolation
/// between ranks `(n-1)*p/100` after sorting — numpy's default `linear`
/// method. Distinct from [`weighted_percentile`]: there is no cumulative
/// weight mass here, only position in the sorted order.
pub fn percentile(values: &[f64], p: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(CoreError::BadInput(
            "values must not be empty".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&p) {
        return Err(CoreError::BadInput(format!(
            "percentile must be in [0, 100], got {p}"
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let n = sorted.len();
    if n == 1 {
        return Ok(sorted[0]);
    }

    let rank = (n - 1) as f64 * p / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return Ok(sorted[lower]);
    }
    let fraction = rank - lower as f64;
    Ok(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// `weighted_percentile(values, weights, 50)`.
pub fn weighted_median(values: &[f64], weights: &[f64]) -> Result<f64> {
    weighted_percentile(values, weights, 50.0)
}

/// Weighted median absolute deviation. `center` defaults to the weighted
/// median when `None`.
pub fn weighted_mad(values: &[f64], weights: &[f64], center: Option<f64>) -> Result<f64> {
    let center = match center {
        Some(c) => c,
        None => weighted_median(values, weights)?,
    };
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    weighted_median(&deviations, weights)
}

/// Uniform weights of length `n`, each `1/n`. Convenience for detectors
/// that fall back to unweighted statistics.
pub fn uniform_weights(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    vec![1.0 / n as f64; n]
}
