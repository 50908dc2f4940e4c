//! Per-point detection verdict record.

use std::collections::BTreeMap;

use serde_json::Value;

/// Direction of an anomaly relative to its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Above,
    Below,
    None,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
            Direction::None => "none",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a verdict carries no bounds/anomaly computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoVerdictReason {
    InsufficientData,
    MissingData,
}

impl NoVerdictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoVerdictReason::InsufficientData => "insufficient_data",
            NoVerdictReason::MissingData => "missing_data",
        }
    }
}

/// Detection metadata: a free-form map that always carries `direction`
/// and `severity` once a verdict has been computed, plus detector-
/// specific fields (e.g. `global_median`, `q1`, `distance`).
#[derive(Debug, Clone, Default)]
pub struct DetectionMetadata {
    fields: BTreeMap<String, Value>,
}

impl DetectionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reason(reason: NoVerdictReason) -> Self {
        let mut m = Self::new();
        m.set("reason", reason.as_str());
        m
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone().into_iter().collect())
    }
}

/// One point's anomaly verdict plus confidence interval and metadata.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub timestamp_millis: i64,
    pub value: Option<f64>,
    pub is_anomaly: bool,
    pub confidence_lower: Option<f64>,
    pub confidence_upper: Option<f64>,
    pub metadata: DetectionMetadata,
}

impl DetectionResult {
    /// Build the result for a point that does not have enough prior
    /// history to evaluate.
    pub fn insufficient_data(timestamp_millis: i64, value: Option<f64>) -> Self {
        Self {
            timestamp_millis,
            value,
            is_anomaly: false,
            confidence_lower: None,
            confidence_upper: None,
            metadata: DetectionMetadata::with_reason(NoVerdictReason::InsufficientData),
        }
    }

    /// Build the result for a point whose value is null/NaN.
    pub fn missing_data(timestamp_millis: i64) -> Self {
        Self {
            timestamp_millis,
            value: None,
            is_anomaly: false,
            confidence_lower: None,
            confidence_upper: None,
            metadata: DetectionMetadata::with_reason(NoVerdictReason::MissingData),
        }
    }

    /// Direction recorded in the metadata, if any.
    pub fn direction(&self) -> Direction {
        match self.metadata.get("direction").and_then(|v| v.as_str()) {
            Some("above") => Direction::Above,
            Some("below") => Direction::Below,
            _ => Direction::None,
        }
    }

    /// Severity recorded in the metadata, defaulting to 0.
    pub fn severity(&self) -> f64 {
        self.metadata
            .get("severity")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }
}
