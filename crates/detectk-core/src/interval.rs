//! Fixed time-step interval parsing and representation.

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// A strictly positive interval, stored internally as whole seconds.
///
/// Two intervals compare equal, hash equal, and order by their `seconds`
/// value alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    seconds: i64,
}

impl Interval {
    /// Build an interval directly from a positive number of seconds.
    pub fn from_seconds(seconds: i64) -> Result<Self> {
        if seconds <= 0 {
            return Err(CoreError::BadInterval(
                "interval seconds must be positive".to_string(),
            ));
        }
        Ok(Self { seconds })
    }

    /// Parse an interval from a `<N><unit>` literal, case-insensitive,
    /// unit in `{s/sec, m/min, h/hour, d/day}`, optionally suffixed with
    /// `s` (e.g. `"7days"`). A bare digit string with no unit is
    /// rejected — callers with an actual integer should use
    /// [`Interval::from_seconds`] instead.
    pub fn parse(literal: &str) -> Result<Self> {
        let trimmed = literal.trim();
        let lower = trimmed.to_ascii_lowercase();
        let split_at = lower.find(|c: char| !c.is_ascii_digit());
        let split_at = match split_at {
            Some(idx) if idx > 0 => idx,
            _ => {
                return Err(CoreError::BadInterval(format!(
                    "invalid interval format: '{literal}'"
                )))
            }
        };

        let (digits, mut unit) = lower.split_at(split_at);
        let value: i64 = digits.parse().map_err(|_| {
            CoreError::BadInterval(format!("invalid interval format: '{literal}'"))
        })?;

        if let Some(stripped) = unit.strip_suffix('s') {
            // Keep "s" itself intact (it's the seconds unit already),
            // only strip a pluralizing trailing 's' on multi-letter units.
            if unit != "s" && !stripped.is_empty() {
                unit = stripped;
            }
        }

        let multiplier = match unit {
            "s" | "sec" => 1,
            "m" | "min" => 60,
            "h" | "hour" => 3_600,
            "d" | "day" => 86_400,
            other => {
                return Err(CoreError::BadInterval(format!(
                    "unknown time unit '{other}' in '{literal}'"
                )))
            }
        };

        if value <= 0 {
            return Err(CoreError::BadInterval(format!(
                "interval must be positive: '{literal}'"
            )));
        }

        Self::from_seconds(value * multiplier)
    }

    /// The interval's length in seconds.
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Floor a UTC-millisecond timestamp to the most recent grid point at
    /// or before it, where the grid is rooted at the Unix epoch and spaced
    /// by this interval.
    pub fn floor_millis(&self, timestamp_millis: i64) -> i64 {
        let step_millis = self.seconds * 1000;
        timestamp_millis.div_euclid(step_millis) * step_millis
    }
}

impl fmt::Display for Interval {
    /// Render using the largest whole unit that evenly divides the
    /// interval, falling back to bare seconds: `86400` -> `"1d"`,
    /// `90` -> `"90s"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s % 86_400 == 0 {
            write!(f, "{}d", s / 86_400)
        } else if s % 3_600 == 0 {
            write!(f, "{}h", s / 3_600)
        } else if s % 60 == 0 {
            write!(f, "{}min", s / 60)
        } else {
            write!(f, "{s}s")
        }
    }
}

impl FromStr for Interval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<i64> for Interval {
    type Error = CoreError;

    fn try_from(seconds: i64) -> Result<Self> {
        Self::from_seconds(seconds)
    }
}
