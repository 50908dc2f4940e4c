//! Alert delivery over named transports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{AlertError, Result};
use crate::orchestrator::AlertPayload;

/// Render `payload` into a message string using `template`, or a
/// built-in default when no template is given. Every named payload
/// field has a placeholder; any placeholder token the payload doesn't
/// recognize — a missing field or a typo — renders as `"N/A"`.
/// Timestamp placeholders render in `payload.timezone`, falling back to
/// UTC for an unrecognized zone name rather than failing delivery.
pub fn format_message(payload: &AlertPayload, template: Option<&str>) -> String {
    let default_template = "[{metric_name}] anomaly at {timestamp}: value={value}, \
         confidence=[{confidence_lower}, {confidence_upper}], direction={direction}, \
         severity={severity}, detector={detector_name}";
    let template = template.unwrap_or(default_template);
    substitute_placeholders(template, &payload_fields(payload))
}

fn opt_f64(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "N/A".to_string())
}

fn payload_fields(payload: &AlertPayload) -> Vec<(&'static str, String)> {
    vec![
        ("metric_name", payload.metric_name.clone()),
        (
            "timestamp",
            render_timestamp(payload.timestamp_millis, &payload.timezone),
        ),
        (
            "value",
            payload.value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string()),
        ),
        ("confidence_lower", opt_f64(payload.confidence_lower)),
        ("confidence_upper", opt_f64(payload.confidence_upper)),
        ("direction", payload.direction.to_string()),
        ("severity", format!("{:.2}", payload.severity)),
        ("detector_name", payload.detector_name.clone()),
        (
            "detector_params",
            payload.detector_params.clone().unwrap_or_else(|| "N/A".to_string()),
        ),
        (
            "detector_count",
            payload.detector_count.map(|c| c.to_string()).unwrap_or_else(|| "N/A".to_string()),
        ),
        ("consecutive_count", payload.consecutive_count.to_string()),
        ("timezone", payload.timezone.clone()),
    ]
}

/// Replace every `{name}` token in `template` with its value from
/// `fields`, or `"N/A"` when `name` isn't a recognized field.
fn substitute_placeholders(template: &str, fields: &[(&'static str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after_brace = &rest[start + 1..];
        match after_brace.find('}') {
            Some(end) => {
                let name = &after_brace[..end];
                match fields.iter().find(|(field, _)| *field == name) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str("N/A"),
                }
                rest = &after_brace[end + 1..];
            }
            None => {
                out.push('{');
                rest = after_brace;
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Format a UTC-millisecond timestamp in the named timezone, falling
/// back to UTC if the name doesn't resolve.
fn render_timestamp(timestamp_millis: i64, timezone: &str) -> String {
    let Some(utc) = DateTime::<Utc>::from_timestamp_millis(timestamp_millis) else {
        return "N/A".to_string();
    };
    match detectk_core::parse_timezone(timezone) {
        Ok(tz) => utc.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        Err(_) => utc.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

/// A named delivery transport for rendered alert payloads. `send` must
/// never panic or propagate transport errors: failures degrade to
/// `false` so one channel's outage does not abort delivery to siblings.
pub trait AlertChannel: Send + Sync {
    fn send(&self, payload: &AlertPayload, template: Option<&str>) -> bool;
}

/// A generic webhook channel posting `{text, username, icon_emoji?,
/// icon_url?}` as JSON.
pub struct WebhookChannel {
    webhook_url: String,
    username: String,
    icon_emoji: Option<String>,
    icon_url: Option<String>,
    timeout: Duration,
}

impl WebhookChannel {
    pub fn new(webhook_url: impl Into<String>, username: impl Into<String>) -> Result<Self> {
        let webhook_url = webhook_url.into();
        if webhook_url.is_empty() {
            return Err(AlertError::BadConfig("webhook_url must not be empty".into()));
        }
        Ok(Self {
            webhook_url,
            username: username.into(),
            icon_emoji: None,
            icon_url: None,
            timeout: Duration::from_secs(10),
        })
    }

    pub fn with_icon_emoji(mut self, icon_emoji: impl Into<String>) -> Self {
        self.icon_emoji = Some(icon_emoji.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl AlertChannel for WebhookChannel {
    fn send(&self, payload: &AlertPayload, template: Option<&str>) -> bool {
        let text = format_message(payload, template);
        let mut body = serde_json::json!({
            "text": text,
            "username": self.username,
        });
        if let Some(emoji) = &self.icon_emoji {
            body["icon_emoji"] = serde_json::Value::String(emoji.clone());
        }
        if let Some(url) = &self.icon_url {
            body["icon_url"] = serde_json::Value::String(url.clone());
        }

        let result = ureq::post(&self.webhook_url)
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
            .send_json(body);

        match result {
            Ok(response) => (200..300).contains(&response.status()),
            Err(err) => {
                warn!(webhook = %self.webhook_url, error = %err, "alert webhook delivery failed");
                false
            }
        }
    }
}

/// A Mattermost-flavored webhook channel: `username = "detectk"`,
/// `icon_emoji = ":warning:"`, 10s timeout.
pub struct MattermostChannel {
    inner: WebhookChannel,
}

impl MattermostChannel {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let inner = WebhookChannel::new(webhook_url, "detectk")?
            .with_icon_emoji(":warning:")
            .with_timeout(Duration::from_secs(10));
        Ok(Self { inner })
    }
}

impl AlertChannel for MattermostChannel {
    fn send(&self, payload: &AlertPayload, template: Option<&str>) -> bool {
        self.inner.send(payload, template)
    }
}
