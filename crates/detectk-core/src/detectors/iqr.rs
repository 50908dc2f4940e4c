//! Interquartile-range detector.

use serde_json::Value;

use super::{rolling_window, DataBundle, DetectorBehavior};
use crate::detection::{DetectionMetadata, DetectionResult};
use crate::error::{CoreError, Result};
use crate::stats::percentile;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrParams {
    pub threshold: f64,
    pub window_size: usize,
    pub min_samples: usize,
}

impl Default for IqrParams {
    fn default() -> Self {
        Self {
            threshold: 1.5,
            window_size: 100,
            min_samples: 30,
        }
    }
}

impl IqrParams {
    fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0) {
            return Err(CoreError::BadConfig("threshold must be positive".into()));
        }
        if self.window_size < 1 {
            return Err(CoreError::BadConfig(
                "window_size must be at least 1".into(),
            ));
        }
        if self.min_samples < 4 {
            return Err(CoreError::BadConfig(
                "min_samples must be at least 4".into(),
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
pub struct IqrDetector {
    params: IqrParams,
}

impl IqrDetector {
    pub fn new(params: IqrParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl DetectorBehavior for IqrDetector {
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

            let q1 = percentile(&window, 25.0)?;
            let q3 = percentile(&window, 75.0)?;
            let iqr = q3 - q1;

            let lower_bound = q1 - p.threshold * iqr;
            let upper_bound = q3 + p.threshold * iqr;
            let is_anomaly = value < lower_bound || value > upper_bound;

            let severity = if iqr.abs() < EPSILON {
                if is_anomaly { f64::INFINITY } else { 0.0 }
            } else if value > upper_bound {
                (value - upper_bound) / iqr
            } else if value < lower_bound {
                (lower_bound - value) / iqr
            } else {
                0.0
            };

            let mut metadata = DetectionMetadata::new();
            metadata
                .set("q1", q1)
                .set("q3", q3)
                .set("iqr", iqr)
                .set("window_size", window.len() as u64)
                .set("severity", severity);
            if is_anomaly {
                metadata.set(
                    "direction",
                    if value > upper_bound { "above" } else { "below" },
                );
            }

            results.push(DetectionResult {
                timestamp_millis: ts,
                value: Some(value),
                is_anomaly,
                confidence_lower: Some(lower_bound),
                confidence_upper: Some(upper_bound),
                metadata,
            });
        }

        Ok(results)
    }

    fn class_tag(&self) -> &'static str {
        "iqr"
    }

    fn param_triples(&self) -> Vec<(&'static str, Value, Value)> {
        let d = IqrParams::default();
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

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bundle_from_values(values: &[f64]) -> DataBundle {
        DataBundle {
            timestamps_millis: (0..values.len() as i64).map(|i| i * 60_000).collect(),
            values: values.iter().map(|&v| Some(v)).collect(),
            seasonality_data: vec![Default::default(); values.len()],
            seasonality_columns: vec![],
        }
    }

    #[test]
    fn rejects_min_samples_below_four() {
        assert!(IqrDetector::new(IqrParams {
            min_samples: 3,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn outlier_flagged_with_expected_quartiles_and_iqr() {
        let mut values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        values.push(50.0);
        let detector = IqrDetector::new(IqrParams {
            threshold: 1.5,
            window_size: 10,
            min_samples: 5,
        })
        .unwrap();
        let bundle = bundle_from_values(&values);
        let results = detector.detect(&bundle).unwrap();
        let last = results.last().unwrap();
        assert!(last.is_anomaly);
        assert_relative_eq!(last.metadata.get("q1").unwrap().as_f64().unwrap(), 3.25, epsilon = 0.01);
        assert_relative_eq!(last.metadata.get("q3").unwrap().as_f64().unwrap(), 7.75, epsilon = 0.01);
        assert_relative_eq!(last.metadata.get("iqr").unwrap().as_f64().unwrap(), 4.5, epsilon = 0.01);
    }

    #[test]
    fn anomalous_points_fall_outside_reported_bounds_normal_points_inside() {
        let mut values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        values.push(50.0);
        let detector = IqrDetector::new(IqrParams {
            threshold: 1.5,
            window_size: 10,
            min_samples: 5,
        })
        .unwrap();
        let bundle = bundle_from_values(&values);
        for r in detector.detect(&bundle).unwrap() {
            if r.metadata.get("reason").is_some() {
                continue;
            }
            let (v, lo, hi) = (r.value.unwrap(), r.confidence_lower.unwrap(), r.confidence_upper.unwrap());
            if r.is_anomaly {
                assert!(v < lo || v > hi);
            } else {
                assert!(lo <= v && v <= hi);
            }
        }
    }
}
