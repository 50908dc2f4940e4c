//! Grid alignment and gap-filling over a fixed interval.

use std::collections::BTreeMap;

use detectk_core::Interval;

/// Snap `timestamp_millis` down to the nearest grid boundary for
/// `interval` (the grid is rooted at the epoch).
pub fn align_to_grid(timestamp_millis: i64, interval: Interval) -> i64 {
    interval.floor_millis(timestamp_millis)
}

/// Bucket raw `(timestamp, value)` rows to their grid point, collapsing
/// duplicates at the same bucket to the last-written value (rows later
/// in input order win).
pub fn bucket_to_grid(
    rows: &[(i64, Option<f64>)],
    interval: Interval,
) -> BTreeMap<i64, Option<f64>> {
    let mut buckets = BTreeMap::new();
    for &(ts, value) in rows {
        let bucket = align_to_grid(ts, interval);
        buckets.insert(bucket, value);
    }
    buckets
}

/// Expand a bucketed, grid-aligned series to the full arithmetic
/// progression between its minimum and maximum timestamp, synthesizing
/// `None` for any grid point absent from the input. Fewer than two
/// distinct input timestamps: returned unchanged (no synthesis), since
/// there is no interval to extrapolate from.
pub fn fill_gaps(buckets: &BTreeMap<i64, Option<f64>>, interval: Interval) -> Vec<(i64, Option<f64>)> {
    if buckets.len() < 2 {
        return buckets.iter().map(|(&ts, &v)| (ts, v)).collect();
    }

    let step = interval.seconds() * 1000;
    let min_ts = *buckets.keys().next().unwrap();
    let max_ts = *buckets.keys().next_back().unwrap();

    let mut out = Vec::new();
    let mut ts = min_ts;
    while ts <= max_ts {
        out.push((ts, buckets.get(&ts).copied().flatten()));
        ts += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hourly() -> Interval {
        Interval::parse("1h").unwrap()
    }

    #[test]
    fn single_gap_is_filled_with_null() {
        let rows = vec![(0, Some(1.0)), (2 * 3_600_000, Some(3.0))];
        let buckets = bucket_to_grid(&rows, hourly());
        let filled = fill_gaps(&buckets, hourly());
        assert_eq!(
            filled,
            vec![
                (0, Some(1.0)),
                (3_600_000, None),
                (7_200_000, Some(3.0)),
            ]
        );
    }

    #[test]
    fn fewer_than_two_points_synthesizes_nothing() {
        let rows = vec![(0, Some(1.0))];
        let buckets = bucket_to_grid(&rows, hourly());
        let filled = fill_gaps(&buckets, hourly());
        assert_eq!(filled, vec![(0, Some(1.0))]);
    }

    #[test]
    fn empty_input_stays_empty() {
        let buckets = bucket_to_grid(&[], hourly());
        assert!(fill_gaps(&buckets, hourly()).is_empty());
    }

    #[test]
    fn duplicate_bucket_keeps_last_written_value() {
        let rows = vec![(100, Some(1.0)), (100, Some(2.0)), (3_600_100, Some(3.0))];
        let buckets = bucket_to_grid(&rows, hourly());
        assert_eq!(buckets.get(&0), Some(&Some(2.0)));
    }

    #[test]
    fn misaligned_timestamps_bucket_to_nearest_lower_grid_point() {
        let rows = vec![(100, Some(1.0))];
        let buckets = bucket_to_grid(&rows, hourly());
        assert_eq!(buckets.get(&0), Some(&Some(1.0)));
    }

    #[test]
    fn output_forms_a_strict_arithmetic_progression() {
        let rows = vec![(0, Some(1.0)), (5 * 3_600_000, Some(2.0))];
        let buckets = bucket_to_grid(&rows, hourly());
        let filled = fill_gaps(&buckets, hourly());
        let timestamps: Vec<i64> = filled.iter().map(|(ts, _)| *ts).collect();
        for w in timestamps.windows(2) {
            assert_eq!(w[1] - w[0], 3_600_000);
        }
        assert_eq!(filled.len(), 6);
    }
}
