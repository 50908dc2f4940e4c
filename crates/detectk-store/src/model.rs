//! Row types for the four internal tables
//! (`_dtk_datapoints`, `_dtk_detections`, `_dtk_tasks`, `_dtk_metrics`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single metric observation on the interval grid.
///
/// Primary key: `(metric_name, timestamp_millis)`. Late writes replace
/// older `created_at_millis` for the same key (last-writer-wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub metric_name: String,
    pub timestamp_millis: i64,
    /// `None` marks a gap-filled or otherwise missing observation.
    pub value: Option<f64>,
    /// Compact JSON object, e.g. `{"hour":3,"is_weekend":false}`.
    pub seasonality_data: String,
    pub interval_seconds: i64,
    /// Comma-separated feature names, identical for every row of a given
    /// metric.
    pub seasonality_columns: String,
    pub created_at_millis: i64,
}

/// A detector's verdict for one metric at one timestamp.
///
/// Primary key: `(metric_name, detector_id, timestamp_millis)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRow {
    pub metric_name: String,
    pub detector_id: String,
    pub timestamp_millis: i64,
    pub is_anomaly: bool,
    pub confidence_lower: Option<f64>,
    pub confidence_upper: Option<f64>,
    pub value: Option<f64>,
    /// Canonical JSON of the detector's non-default parameters.
    pub detector_params: String,
    /// Compact JSON detection metadata (direction, severity, reason, …).
    pub detection_metadata: String,
    pub created_at_millis: i64,
}

/// Lifecycle state of a task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// A persistent lock / progress record for one pipeline or detector run.
///
/// Primary key: `(metric_name, detector_id, process_type)`. For
/// pipeline-level locks, `detector_id` and `process_type` are both
/// `"pipeline"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRow {
    pub metric_name: String,
    pub detector_id: String,
    pub process_type: String,
    pub status: TaskStatus,
    pub started_at_millis: i64,
    pub updated_at_millis: i64,
    pub last_processed_timestamp_millis: Option<i64>,
    pub error_message: Option<String>,
    pub timeout_seconds: i64,
    pub last_alert_sent_millis: Option<i64>,
    pub alert_count: u64,
}

impl TaskRow {
    /// Whether this row currently represents a live, held lock: running
    /// and not yet past its timeout.
    pub fn is_locked(&self, now_millis: i64) -> bool {
        self.status == TaskStatus::Running
            && self.started_at_millis + self.timeout_seconds * 1000 > now_millis
    }
}

/// Lock/status snapshot returned by `check_lock`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub locked: bool,
    /// Identity of the current or most recent holder, e.g. a process or
    /// host tag. There is no separate worker id tracked per lock, so this
    /// is derived from the task row's own key.
    pub locked_by: Option<String>,
    pub started_at_millis: i64,
    pub timeout_seconds: i64,
    pub status: TaskStatus,
}

/// Alerting conditions embedded in the metric registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConditionsRow {
    pub min_detectors: u32,
    pub direction: String,
    pub consecutive_anomalies: u32,
    pub no_data_alert: bool,
}

impl Default for AlertConditionsRow {
    fn default() -> Self {
        Self {
            min_detectors: 1,
            direction: "any".to_string(),
            consecutive_anomalies: 1,
            no_data_alert: false,
        }
    }
}

/// Metric registry row, upserted keyed on
/// `metric_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfigRow {
    pub metric_name: String,
    pub path: String,
    pub interval_seconds: i64,
    pub loading_batch_size: u32,
    pub is_alert_enabled: bool,
    pub timezone: String,
    pub alert_conditions: AlertConditionsRow,
    pub enabled: bool,
    pub tags: BTreeMap<String, String>,
}
