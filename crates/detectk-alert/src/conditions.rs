//! Alerting conditions and the per-timestamp detection records the
//! orchestrator consumes.

use detectk_core::Direction;
use serde::{Deserialize, Serialize};

/// The direction constraint a consecutive run must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionMode {
    #[default]
    Any,
    Same,
    Up,
    Down,
}

/// Firing conditions for one metric's alert orchestrator, plus the
/// timezone the candidate timestamp is rendered in.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConditions {
    pub min_detectors: u32,
    pub direction: DirectionMode,
    pub consecutive_anomalies: u32,
    /// Timezone alert payload timestamps render in (spec §4.6). Does not
    /// affect any decision logic, only presentation.
    pub display_timezone: String,
}

impl Default for AlertConditions {
    fn default() -> Self {
        Self {
            min_detectors: 1,
            direction: DirectionMode::Any,
            consecutive_anomalies: 1,
            display_timezone: "UTC".to_string(),
        }
    }
}

/// One detector's verdict for one metric at one timestamp, as consumed
/// by the orchestrator. Records need not arrive sorted.
#[derive(Debug, Clone)]
pub struct DetectionRecord {
    pub timestamp_millis: i64,
    pub detector_name: String,
    pub detector_id: String,
    pub value: Option<f64>,
    pub is_anomaly: bool,
    pub confidence_lower: Option<f64>,
    pub confidence_upper: Option<f64>,
    pub direction: Direction,
    pub severity: f64,
    pub detector_params: String,
}
