//! The alert decision procedure: consensus, directional, and
//! consecutive-run firing conditions, plus grid-boundary helpers.

use std::collections::{BTreeMap, HashSet};

use detectk_core::{Direction, Interval};

use crate::channels::AlertChannel;
use crate::conditions::{AlertConditions, DetectionRecord, DirectionMode};

/// The rendered decision of `should_alert`: whether to fire and, if so,
/// the payload to dispatch.
#[derive(Debug, Clone)]
pub struct AlertPayload {
    pub metric_name: String,
    pub timestamp_millis: i64,
    pub value: Option<f64>,
    pub confidence_lower: Option<f64>,
    pub confidence_upper: Option<f64>,
    pub direction: Direction,
    pub severity: f64,
    /// The firing detector's name, or `"<k> detectors"` when more than
    /// one detector is anomalous at the candidate timestamp.
    pub detector_name: String,
    /// Present only when exactly one detector fired.
    pub detector_params: Option<String>,
    /// Present only when more than one detector fired: the count.
    pub detector_count: Option<u32>,
    pub consecutive_count: u32,
    /// Timezone `timestamp_millis` should render in when formatted.
    pub timezone: String,
}

struct Step {
    is_anomaly: bool,
    direction: Direction,
}

/// Majority direction across `directions`, ties broken by preferring a
/// non-`none` direction, then `up`.
fn majority_direction<I: IntoIterator<Item = Direction>>(directions: I) -> Direction {
    let (mut above, mut below, mut none) = (0u32, 0u32, 0u32);
    for d in directions {
        match d {
            Direction::Above => above += 1,
            Direction::Below => below += 1,
            Direction::None => none += 1,
        }
    }
    let max = above.max(below).max(none);
    if above == max {
        Direction::Above
    } else if below == max {
        Direction::Below
    } else {
        Direction::None
    }
}

fn fold_steps(records: &[DetectionRecord]) -> Vec<(i64, Step)> {
    let mut by_ts: BTreeMap<i64, Vec<&DetectionRecord>> = BTreeMap::new();
    for r in records {
        by_ts.entry(r.timestamp_millis).or_default().push(r);
    }
    let mut steps: Vec<(i64, Step)> = by_ts
        .into_iter()
        .map(|(ts, rs)| {
            let is_anomaly = rs.iter().any(|r| r.is_anomaly);
            let direction = majority_direction(rs.iter().map(|r| r.direction));
            (ts, Step { is_anomaly, direction })
        })
        .collect();
    steps.sort_by(|a, b| b.0.cmp(&a.0));
    steps
}

fn consecutive_run_length(steps: &[(i64, Step)], direction_mode: DirectionMode) -> u32 {
    let mut run = 0u32;
    let mut run_direction: Option<Direction> = None;

    for (_, step) in steps {
        if !step.is_anomaly {
            break;
        }
        let passes = match direction_mode {
            DirectionMode::Any => true,
            DirectionMode::Same => match run_direction {
                None => true,
                Some(d) => d == step.direction,
            },
            DirectionMode::Up => step.direction == Direction::Above,
            DirectionMode::Down => step.direction == Direction::Below,
        };
        if !passes {
            break;
        }
        if direction_mode == DirectionMode::Same && run_direction.is_none() {
            run_direction = Some(step.direction);
        }
        run += 1;
    }
    run
}

/// Decide whether to fire an alert for `records`, one metric's recent
/// detection history across all its detectors. Records need not be
/// sorted by timestamp.
pub fn should_alert(
    metric_name: &str,
    conditions: &AlertConditions,
    records: &[DetectionRecord],
) -> (bool, Option<AlertPayload>) {
    if records.is_empty() {
        return (false, None);
    }

    let candidate_ts = records.iter().map(|r| r.timestamp_millis).max().unwrap();
    let at_candidate: Vec<&DetectionRecord> = records
        .iter()
        .filter(|r| r.timestamp_millis == candidate_ts)
        .collect();

    let anomalous_ids: HashSet<&str> = at_candidate
        .iter()
        .filter(|r| r.is_anomaly)
        .map(|r| r.detector_id.as_str())
        .collect();
    let k = anomalous_ids.len() as u32;
    if k < conditions.min_detectors {
        return (false, None);
    }

    let steps = fold_steps(records);
    let run_length = consecutive_run_length(&steps, conditions.direction);
    if run_length < conditions.consecutive_anomalies {
        return (false, None);
    }

    let anomalous_at_candidate: Vec<&&DetectionRecord> = at_candidate
        .iter()
        .filter(|r| r.is_anomaly)
        .collect();
    let leader = anomalous_at_candidate
        .iter()
        .max_by(|a, b| a.severity.partial_cmp(&b.severity).unwrap())
        .expect("k >= 1 implies at least one anomalous record at the candidate timestamp");

    let (detector_name, detector_params, detector_count) = if k == 1 {
        (leader.detector_name.clone(), Some(leader.detector_params.clone()), None)
    } else {
        (format!("{k} detectors"), None, Some(k))
    };

    let payload = AlertPayload {
        metric_name: metric_name.to_string(),
        timestamp_millis: candidate_ts,
        value: leader.value,
        confidence_lower: leader.confidence_lower,
        confidence_upper: leader.confidence_upper,
        direction: leader.direction,
        severity: leader.severity,
        detector_name,
        detector_params,
        detector_count,
        consecutive_count: run_length,
        timezone: conditions.display_timezone.clone(),
    };

    (true, Some(payload))
}

/// Floor `now_millis` to the previous grid boundary at `interval`, then
/// step back one more interval: the last boundary whose window has
/// fully elapsed.
pub fn get_last_complete_point(now_millis: i64, interval: Interval) -> i64 {
    interval.floor_millis(now_millis) - interval.seconds() * 1000
}

/// Dispatch `payload` to every channel, collecting a per-channel result.
/// A channel that fails does not abort dispatch to its siblings.
pub fn send_alerts(
    payload: &AlertPayload,
    channels: &[(&str, &dyn AlertChannel)],
    template: Option<&str>,
) -> Vec<(String, bool)> {
    channels
        .iter()
        .map(|(name, channel)| {
            let ok = channel.send(payload, template);
            (name.to_string(), ok)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: i64, detector: &str, is_anomaly: bool, direction: Direction, severity: f64) -> DetectionRecord {
        DetectionRecord {
            timestamp_millis: ts,
            detector_name: detector.to_string(),
            detector_id: detector.to_string(),
            value: Some(100.0),
            is_anomaly,
            confidence_lower: Some(0.0),
            confidence_upper: Some(50.0),
            direction,
            severity,
            detector_params: "{}".to_string(),
        }
    }

    #[test]
    fn empty_records_never_fire() {
        let (fire, payload) = should_alert("m", &AlertConditions::default(), &[]);
        assert!(!fire);
        assert!(payload.is_none());
    }

    #[test]
    fn two_detectors_at_latest_timestamp_meets_min_detectors_and_reports_count() {
        let records = vec![
            record(0, "mad", true, Direction::Above, 4.0),
            record(0, "zscore", true, Direction::Above, 3.0),
        ];
        let conditions = AlertConditions {
            min_detectors: 2,
            direction: DirectionMode::Any,
            consecutive_anomalies: 1,
            ..Default::default()
        };
        let (fire, payload) = should_alert("m", &conditions, &records);
        assert!(fire);
        let payload = payload.unwrap();
        assert_eq!(payload.detector_name, "2 detectors");
        assert_eq!(payload.detector_count, Some(2));
        assert_eq!(payload.severity, 4.0);
    }

    #[test]
    fn same_direction_mode_stops_at_direction_change() {
        let records = vec![
            record(0, "d", true, Direction::Below, 5.0),
            record(60_000, "d", true, Direction::Above, 4.0),
            record(120_000, "d", true, Direction::Above, 3.0),
        ];
        let conditions = AlertConditions {
            min_detectors: 1,
            direction: DirectionMode::Same,
            consecutive_anomalies: 3,
            ..Default::default()
        };
        let (fire, _) = should_alert("m", &conditions, &records);
        assert!(!fire, "run length is 2 (above,above), not 3");
    }

    #[test]
    fn normal_step_breaks_the_run() {
        let records = vec![
            record(0, "d", true, Direction::Above, 1.0),
            record(60_000, "d", false, Direction::None, 0.0),
            record(120_000, "d", true, Direction::Above, 1.0),
            record(180_000, "d", true, Direction::Above, 1.0),
        ];
        let conditions = AlertConditions {
            min_detectors: 1,
            direction: DirectionMode::Any,
            consecutive_anomalies: 3,
            ..Default::default()
        };
        let (fire, _) = should_alert("m", &conditions, &records);
        assert!(!fire);
    }

    #[test]
    fn last_complete_point_steps_back_one_full_interval() {
        use chrono::{TimeZone, Utc};
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 13, 23, 0).unwrap().timestamp_millis();
        let ten_min = Interval::parse("10min").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 13, 10, 0).unwrap().timestamp_millis();
        assert_eq!(get_last_complete_point(now, ten_min), expected);

        let one_hour = Interval::parse("1h").unwrap();
        let expected_h = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap().timestamp_millis();
        assert_eq!(get_last_complete_point(now, one_hour), expected_h);
    }

    #[test]
    fn earlier_anomalous_history_never_flips_a_fire_to_silence() {
        let conditions = AlertConditions {
            min_detectors: 1,
            direction: DirectionMode::Any,
            consecutive_anomalies: 1,
            ..Default::default()
        };
        let short = vec![record(120_000, "d", true, Direction::Above, 1.0)];
        let (fire_short, _) = should_alert("m", &conditions, &short);
        assert!(fire_short);

        let mut extended = short.clone();
        extended.push(record(60_000, "d", true, Direction::Above, 1.0));
        extended.push(record(0, "d", true, Direction::Above, 1.0));
        let (fire_extended, _) = should_alert("m", &conditions, &extended);
        assert!(fire_extended);
    }
}
