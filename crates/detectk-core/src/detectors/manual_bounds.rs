//! Manual-bounds detector. Stateless: no rolling window.

use serde_json::Value;

use super::{DataBundle, DetectorBehavior};
use crate::detection::{DetectionMetadata, DetectionResult};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManualBoundsParams {
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
}

impl ManualBoundsParams {
    fn validate(&self) -> Result<()> {
        if self.lower_bound.is_none() && self.upper_bound.is_none() {
            return Err(CoreError::BadConfig(
                "at least one of lower_bound or upper_bound is required".into(),
            ));
        }
        if let (Some(lower), Some(upper)) = (self.lower_bound, self.upper_bound) {
            if !(lower < upper) {
                return Err(CoreError::BadConfig(
                    "lower_bound must be less than upper_bound".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ManualBoundsDetector {
    params: ManualBoundsParams,
}

impl ManualBoundsDetector {
    pub fn new(params: ManualBoundsParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }
}

impl DetectorBehavior for ManualBoundsDetector {
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

            let below = p.lower_bound.map(|lb| value < lb).unwrap_or(false);
            let above = p.upper_bound.map(|ub| value > ub).unwrap_or(false);
            let is_anomaly = below || above;

            let mut metadata = DetectionMetadata::new();
            if is_anomaly {
                let (direction, distance) = if below {
                    ("below", p.lower_bound.unwrap() - value)
                } else {
                    ("above", value - p.upper_bound.unwrap())
                };
                metadata
                    .set("direction", direction)
                    .set("distance", distance)
                    .set("severity", distance);
            }

            results.push(DetectionResult {
                timestamp_millis: ts,
                value: Some(value),
                is_anomaly,
                confidence_lower: p.lower_bound,
                confidence_upper: p.upper_bound,
                metadata,
            });
        }

        Ok(results)
    }

    fn class_tag(&self) -> &'static str {
        "manual_bounds"
    }

    fn param_triples(&self) -> Vec<(&'static str, Value, Value)> {
        let lower = self.params.lower_bound.map(Value::from).unwrap_or(Value::Null);
        let upper = self.params.upper_bound.map(Value::from).unwrap_or(Value::Null);
        vec![
            ("lower_bound", lower, Value::Null),
            ("upper_bound", upper, Value::Null),
        ]
    }
}
