//! Median Absolute Deviation detector.

use serde_json::Value;

use super::{rolling_window, DataBundle, DetectorBehavior};
use crate::detection::{DetectionMetadata, DetectionResult};
use crate::error::{CoreError, Result};
use crate::seasonality;
use crate::stats::{uniform_weights, weighted_mad, weighted_median};

const EPSILON: f64 = 1e-9;
/// Gaussian-consistent scale factor: for normally distributed data the
/// MAD underestimates sigma by this constant.
const GAUSSIAN_MAD_SCALE: f64 = 1.4826;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MadParams {
    pub threshold: f64,
    pub window_size: usize,
    pub min_samples: usize,
}

impl Default for MadParams {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            window_size: 100,
            min_samples: 30,
        }
    }
}

impl MadParams {
    fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0) {
            return Err(CoreError::BadConfig("threshold must be positive".into()));
        }
        if self.window_size < 1 {
            return Err(CoreError::BadConfig(
                "window_size must be at least 1".into(),
            ));
        }
        if self.min_samples < 1 {
            return Err(CoreError::BadConfig(
                "min_samples must be at least 1".into(),
            ));
        }
        if self.min_samples > self.window_size {
            return Err(CoreError::BadConfig(
                "min_samples cannot exceed window_size".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MadDetector {
    params: MadParams,
}

impl MadDetector {
    pub fn new(params: MadParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl DetectorBehavior for MadDetector {
    fn detect(&self, bundle: &DataBundle) -> Result<Vec<DetectionResult>> {
        let p = &self.params;
        let mut results = Vec::with_capacity(bundle.len());

        for i in 0..bundle.len() {
            let ts = bundle.timestamps_millis[i];
            let value = bundle.values[i];

            let value = match value.filter(|v| v.is_finite()) {
                Some(v) => v,
                None => {
                    results.push(DetectionResult::missing_data(ts));
                    continue;
                }
            };

            let window = match rolling_window(bundle, i, p.window_size, p.min_samples) {
                Some(w) => w,
                None => {
                    results.push(DetectionResult::insufficient_data(ts, Some(value)));
                    continue;
                }
            };
            let (window_values, window_seasonality) = window;

            let uniform = uniform_weights(window_values.len());
            let global_median = weighted_median(&window_values, &uniform)?;
            let global_mad = weighted_mad(&window_values, &uniform, Some(global_median))?;

            let target_seasonality = &bundle.seasonality_data[i];
            let (adjusted_median, adjusted_mad) = if bundle.seasonality_columns.is_empty() {
                (global_median, global_mad)
            } else {
                let weights = seasonality_weights(target_seasonality, &window_seasonality);
                let adj_median = weighted_median(&window_values, &weights)?;
                let adj_mad = weighted_mad(&window_values, &weights, Some(adj_median))?;
                (adj_median, adj_mad)
            };

            let scale = (adjusted_mad * GAUSSIAN_MAD_SCALE).max(EPSILON);
            let z = (value - adjusted_median).abs() / scale;
            let is_anomaly = z > p.threshold;

            let mut metadata = DetectionMetadata::new();
            metadata
                .set("global_median", global_median)
                .set("global_mad", global_mad)
                .set("adjusted_median", adjusted_median)
                .set("adjusted_mad", adjusted_mad)
                .set("window_size", window_values.len() as u64)
                .set("severity", z);
            if is_anomaly {
                metadata.set(
                    "direction",
                    if value > adjusted_median { "above" } else { "below" },
                );
            }

            results.push(DetectionResult {
                timestamp_millis: ts,
                value: Some(value),
                is_anomaly,
                confidence_lower: Some(adjusted_median - p.threshold * scale),
                confidence_upper: Some(adjusted_median + p.threshold * scale),
                metadata,
            });
        }

        Ok(results)
    }

    fn class_tag(&self) -> &'static str {
        "mad"
    }

    fn param_triples(&self) -> Vec<(&'static str, Value, Value)> {
        let d = MadParams::default();
        vec![
            ("threshold", self.params.threshold.into(), d.threshold.into()),
            (
                "window_size",
                (self.params.window_size as u64).into(),
                (d.window_size as u64).into(),
            ),
            (
                "min_samples",
                (self.params.min_samples as u64).into(),
                (d.min_samples as u64).into(),
            ),
        ]
    }
}

/// Weights proportional to seasonality match: exact-match rows receive
/// strictly greater weight than non-matching rows whenever any mismatch
/// exists in the window. Falls back to uniform weights if
/// every row matches or none do.
fn seasonality_weights(
    target: &seasonality::SeasonalityData,
    window: &[&seasonality::SeasonalityData],
) -> Vec<f64> {
    let matches: Vec<bool> = window.iter().map(|s| seasonality::matches(target, s)).collect();
    let n_match = matches.iter().filter(|&&m| m).count();

    if n_match == 0 || n_match == window.len() {
        return uniform_weights(window.len());
    }

    // Matching rows collectively carry MATCH_MASS of the total weight,
    // split uniformly among themselves; non-matching rows split the rest.
    const MATCH_MASS: f64 = 0.8;
    let n_non_match = window.len() - n_match;
    let match_weight = MATCH_MASS / n_match as f64;
    let non_match_weight = (1.0 - MATCH_MASS) / n_non_match as f64;

    matches
        .iter()
        .map(|&m| if m { match_weight } else { non_match_weight })
        .collect()
}
