//! Alert orchestration and delivery: decide whether recent detection
//! history should fire, render the payload, and dispatch to channels.

pub mod channels;
pub mod conditions;
pub mod error;
pub mod orchestrator;

pub use channels::{format_message, AlertChannel, MattermostChannel, WebhookChannel};
pub use conditions::{AlertConditions, DetectionRecord, DirectionMode};
pub use error::{AlertError, Result};
pub use orchestrator::{get_last_complete_point, send_alerts, should_alert, AlertPayload};
