//! Seasonality feature extraction and the allow-listed feature set.
//!
//! Features are computed in UTC by default; a metric may configure a
//! display timezone (spec §4.4: "UTC unless a display timezone is
//! configured"), in which case the calendar fields (hour, day-of-week,
//! ...) are read from the timestamp's local representation in that zone.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::error::{CoreError, Result};

/// The seasonality feature allow-list.
pub const ALLOWED_FEATURES: &[&str] = &[
    "hour",
    "day_of_week",
    "month",
    "is_weekend",
    "day_of_month",
    "week_of_year",
    "quarter",
];

/// Validate a list of requested seasonality columns against the
/// allow-list, rejecting unknown names and duplicates.
pub fn validate_columns(columns: &[String]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for col in columns {
        if !ALLOWED_FEATURES.contains(&col.as_str()) {
            return Err(CoreError::BadConfig(format!(
                "unknown seasonality column '{col}'"
            )));
        }
        if !seen.insert(col.as_str()) {
            return Err(CoreError::BadConfig(format!(
                "duplicate seasonality column '{col}'"
            )));
        }
    }
    Ok(())
}

/// One point's seasonality feature values, keyed by feature name.
pub type SeasonalityData = BTreeMap<String, Value>;

/// Parse a metric's configured display timezone (e.g. `"UTC"`,
/// `"Europe/Berlin"`) into a `chrono_tz::Tz`. Fails with `BadConfig` on
/// an unrecognized name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    Tz::from_str(name)
        .map_err(|_| CoreError::BadConfig(format!("unknown timezone '{name}'")))
}

/// Compute the subset of `columns` for a UTC-millisecond `timestamp`,
/// reading calendar fields from UTC.
pub fn extract(timestamp_millis: i64, columns: &[String]) -> SeasonalityData {
    extract_with(timestamp_millis, columns, Utc)
}

/// Compute the subset of `columns` for a UTC-millisecond `timestamp`,
/// reading calendar fields from the given timezone's local
/// representation of that instant.
pub fn extract_in_timezone(timestamp_millis: i64, columns: &[String], tz: Tz) -> SeasonalityData {
    extract_with(timestamp_millis, columns, tz)
}

fn extract_with<Tz2: TimeZone>(
    timestamp_millis: i64,
    columns: &[String],
    tz: Tz2,
) -> SeasonalityData
where
    Tz2::Offset: std::fmt::Display,
{
    let dt = Utc
        .timestamp_millis_opt(timestamp_millis)
        .unwrap()
        .with_timezone(&tz);
    let mut out = SeasonalityData::new();
    for col in columns {
        let value = match col.as_str() {
            "hour" => Value::from(dt.hour()),
            "day_of_week" => Value::from(dt.weekday().num_days_from_monday()),
            "month" => Value::from(dt.month()),
            "is_weekend" => {
                let wd = dt.weekday().num_days_from_monday();
                Value::from(wd == 5 || wd == 6)
            }
            "day_of_month" => Value::from(dt.day()),
            "week_of_year" => Value::from(dt.iso_week().week()),
            "quarter" => Value::from((dt.month0() / 3) + 1),
            _ => continue,
        };
        out.insert(col.clone(), value);
    }
    out
}

/// Serialize seasonality data as compact JSON, the wire form stored
/// alongside each datapoint.
pub fn to_json_string(data: &SeasonalityData) -> String {
    serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string())
}

/// Whether two seasonality feature maps agree on every feature they both
/// define. Used by detectors to decide which prior points "match" the
/// target point's seasonality for weighting purposes.
pub fn matches(target: &SeasonalityData, candidate: &SeasonalityData) -> bool {
    if target.is_empty() {
        return true;
    }
    target.iter().all(|(k, v)| candidate.get(k) == Some(v))
}
