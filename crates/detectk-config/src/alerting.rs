//! Declarative alerting configuration: firing conditions plus the set
//! of channels to notify.

use serde::{Deserialize, Serialize};

use detectk_alert::{AlertConditions, DirectionMode};

fn default_min_detectors() -> u32 {
    1
}

fn default_consecutive_anomalies() -> u32 {
    1
}

fn default_direction() -> DirectionMode {
    DirectionMode::Any
}

/// Serde mirror of `detectk_alert::AlertConditions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConditionsSpec {
    #[serde(default = "default_min_detectors")]
    pub min_detectors: u32,
    #[serde(default = "default_direction")]
    pub direction: DirectionMode,
    #[serde(default = "default_consecutive_anomalies")]
    pub consecutive_anomalies: u32,
}

impl Default for AlertConditionsSpec {
    fn default() -> Self {
        Self {
            min_detectors: default_min_detectors(),
            direction: default_direction(),
            consecutive_anomalies: default_consecutive_anomalies(),
        }
    }
}

impl From<AlertConditionsSpec> for AlertConditions {
    fn from(spec: AlertConditionsSpec) -> Self {
        AlertConditions {
            min_detectors: spec.min_detectors,
            direction: spec.direction,
            consecutive_anomalies: spec.consecutive_anomalies,
            ..Default::default()
        }
    }
}

/// One configured delivery target. `kind` selects the channel
/// implementation; `webhook_url` is shared by both kinds this crate
/// currently knows how to build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelSpec {
    Webhook { webhook_url: String, username: Option<String> },
    Mattermost { webhook_url: String },
}

/// Full alerting configuration for one metric.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AlertingSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: AlertConditionsSpec,
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    #[serde(default)]
    pub message_template: Option<String>,
}
