//! The metric registry entry: everything the task manager needs to
//! drive one metric's Load -> Detect -> Alert pipeline, in typed,
//! serde-deserializable form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use detectk_core::{Interval, TemplateMode};

use crate::alerting::AlertingSpec;
use crate::detector_spec::DetectorSpec;
use crate::error::{ConfigError, Result};

fn default_loading_batch_size() -> u32 {
    1_000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_template_mode() -> TemplateMode {
    TemplateMode::Lenient
}

fn default_true() -> bool {
    true
}

fn default_total_timeout_seconds() -> i64 {
    3_600
}

fn default_detection_lookback_points() -> u32 {
    500
}

/// One metric's full configuration: where to pull it from, how to grid-
/// align and enrich it, which detectors to run over it, and (optionally)
/// how to alert on its detections.
///
/// Upserted keyed on `metric_name`, matching `_dtk_metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    pub metric_name: String,

    /// Opaque origin of the extraction query (e.g. a config file path);
    /// parsing config files is out of scope, this is carried verbatim.
    pub path: String,

    /// The query template rendered by the loader (see
    /// `detectk_core::QueryTemplate`), with `{{ dtk_start_time }}`,
    /// `{{ dtk_end_time }}`, `{{ interval_seconds }}` and any
    /// metric-specific placeholders.
    pub query: String,

    /// Grid interval, either `"600"` (seconds) or a literal like
    /// `"10min"`.
    #[serde(deserialize_with = "deserialize_interval")]
    pub interval: Interval,

    #[serde(default = "default_loading_batch_size")]
    pub loading_batch_size: u32,

    #[serde(default)]
    pub seasonality_columns: Vec<String>,

    /// Display timezone: seasonality calendar fields (hour, day_of_week,
    /// ...) are read from the timestamp's local representation in this
    /// zone, and alert payload timestamps render in it. Grid alignment
    /// and gap-fill bucketing stay UTC-based regardless.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_template_mode")]
    pub template_mode: TemplateMode,

    #[serde(default = "default_true")]
    pub fill_gaps: bool,

    #[serde(default)]
    pub detectors: Vec<DetectorSpec>,

    #[serde(default)]
    pub alerting: Option<AlertingSpec>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Total budget for one pipeline run, used both as the persistent
    /// lock's timeout (stale-lock takeover) and as the run's soft
    /// cancellation deadline.
    #[serde(default = "default_total_timeout_seconds")]
    pub total_timeout_seconds: i64,

    /// How many trailing datapoints the Detect step reads per run to
    /// give rolling-window detectors enough prior context. Not a spec
    /// concept per se; an engineering knob bounding how much history a
    /// single run re-scores.
    #[serde(default = "default_detection_lookback_points")]
    pub detection_lookback_points: u32,
}

fn deserialize_interval<'de, D>(deserializer: D) -> std::result::Result<Interval, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntervalLiteral {
        Seconds(i64),
        Text(String),
    }
    let literal = IntervalLiteral::deserialize(deserializer)?;
    match literal {
        IntervalLiteral::Seconds(s) => {
            Interval::from_seconds(s).map_err(serde::de::Error::custom)
        }
        IntervalLiteral::Text(s) => Interval::parse(&s).map_err(serde::de::Error::custom),
    }
}

impl MetricConfig {
    /// Validate cross-field invariants the schema alone can't express:
    /// at least one detector configured, and seasonality columns within
    /// the allow-list (delegated to `detectk_core`).
    pub fn validate(&self) -> Result<()> {
        if self.metric_name.trim().is_empty() {
            return Err(ConfigError::BadMetric {
                metric: self.metric_name.clone(),
                reason: "metric_name must not be empty".to_string(),
            });
        }
        if self.detectors.is_empty() {
            return Err(ConfigError::BadMetric {
                metric: self.metric_name.clone(),
                reason: "at least one detector must be configured".to_string(),
            });
        }
        detectk_core::validate_seasonality_columns(&self.seasonality_columns).map_err(|e| {
            ConfigError::BadMetric {
                metric: self.metric_name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }

    pub fn is_alert_enabled(&self) -> bool {
        self.alerting.as_ref().is_some_and(|a| a.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_json() -> serde_json::Value {
        serde_json::json!({
            "metric_name": "checkout.errors",
            "path": "metrics/checkout_errors.yml",
            "query": "select timestamp, value from t where ts between {{ dtk_start_time }} and {{ dtk_end_time }}",
            "interval": "10min",
            "detectors": [{"kind": "mad"}]
        })
    }

    #[test]
    fn deserializes_interval_literal() {
        let config: MetricConfig = serde_json::from_value(base_json()).unwrap();
        assert_eq!(config.interval.seconds(), 600);
    }

    #[test]
    fn deserializes_interval_as_bare_integer_seconds() {
        let mut json = base_json();
        json["interval"] = serde_json::json!(60);
        let config: MetricConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.interval.seconds(), 60);
    }

    #[test]
    fn applies_defaults() {
        let config: MetricConfig = serde_json::from_value(base_json()).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert!(config.fill_gaps);
        assert!(config.enabled);
        assert_eq!(config.loading_batch_size, 1_000);
    }

    #[test]
    fn validate_requires_at_least_one_detector() {
        let mut config: MetricConfig = serde_json::from_value(base_json()).unwrap();
        config.detectors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_seasonality_column() {
        let mut config: MetricConfig = serde_json::from_value(base_json()).unwrap();
        config.seasonality_columns = vec!["bogus".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn is_alert_enabled_reflects_alerting_spec() {
        let mut config: MetricConfig = serde_json::from_value(base_json()).unwrap();
        assert!(!config.is_alert_enabled());
        config.alerting = Some(AlertingSpec {
            enabled: true,
            ..Default::default()
        });
        assert!(config.is_alert_enabled());
    }
}
