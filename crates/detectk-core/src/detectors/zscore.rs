//! Classical rolling Z-Score detector.

use serde_json::Value;

use super::{rolling_window, DataBundle, DetectorBehavior};
use crate::detection::{DetectionMetadata, DetectionResult};
use crate::error::{CoreError, Result};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScoreParams {
    pub threshold: f64,
    pub window_size: usize,
    pub min_samples: usize,
}

impl Default for ZScoreParams {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            window_size: 100,
            min_samples: 30,
        }
    }
}

impl ZScoreParams {
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
pub struct ZScoreDetector {
    params: ZScoreParams,
}

impl ZScoreDetector {
    pub fn new(params: ZScoreParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = if values.len() > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    (mean, variance.sqrt())
}

impl DetectorBehavior for ZScoreDetector {
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
                Some((values, _)) => values,
                None => {
                    results.push(DetectionResult::insufficient_data(ts, Some(value)));
                    continue;
                }
            };

            let (mean, std_dev) = mean_std(&window);
            let sigma = std_dev.max(EPSILON);
            let score = (value - mean) / sigma;
            let is_anomaly = score.abs() > p.threshold;

            let mut metadata = DetectionMetadata::new();
            metadata
                .set("mean", mean)
                .set("std_dev", std_dev)
                .set("window_size", window.len() as u64)
                .set("severity", score.abs());
            if is_anomaly {
                metadata.set("direction", if value > mean { "above" } else { "below" });
            }

            results.push(DetectionResult {
                timestamp_millis: ts,
                value: Some(value),
                is_anomaly,
                confidence_lower: Some(mean - p.threshold * sigma),
                confidence_upper: Some(mean + p.threshold * sigma),
                metadata,
            });
        }

        Ok(results)
    }

    fn class_tag(&self) -> &'static str {
        "zscore"
    }

    fn param_triples(&self) -> Vec<(&'static str, Value, Value)> {
        let d = ZScoreParams::default();
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
