//! The narrow persistence boundary and an in-memory reference
//! implementation.
//!
//! The persistent lock is the system's only mutual exclusion primitive,
//! so acquiring it must be a genuine compare-and-swap, never a racy
//! read-then-write. The in-memory store below holds everything behind a
//! single mutex, so that property falls out for free; a real backend
//! (e.g. a merge-on-read warehouse) would need an explicit
//! double-read-compare protocol instead.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::model::{Datapoint, DetectionRow, LockInfo, MetricConfigRow, TaskRow, TaskStatus};

/// Narrow, testable interface over the four internal tables.
///
/// Implementations are expected to be safe to call concurrently from
/// multiple processes/hosts per metric; the locking quartet is the
/// system's only mutual-exclusion primitive.
pub trait InternalStore: Send + Sync {
    /// Create any of the four internal tables that do not yet exist.
    /// Idempotent.
    fn ensure_tables(&self) -> Result<()>;

    /// Batch insert datapoints, duplicate-key conflicts dropped
    /// (`conflict=ignore`).
    fn save_datapoints(&self, datapoints: &[Datapoint]) -> Result<usize>;

    /// Batch insert detection rows.
    fn save_detections(&self, detections: &[DetectionRow]) -> Result<usize>;

    /// Latest saved datapoint timestamp for `metric`, the loader's resume
    /// watermark.
    fn get_last_datapoint_timestamp(&self, metric_name: &str) -> Result<Option<i64>>;

    /// Up to `limit` most recent datapoints for `metric` with timestamp
    /// `<= before_millis`, ascending by timestamp. The window a detector
    /// reads before scoring its newest points.
    fn get_datapoints_tail(
        &self,
        metric_name: &str,
        before_millis: i64,
        limit: usize,
    ) -> Result<Vec<Datapoint>>;

    /// Tail of detection rows for `metric` across all detectors, from
    /// `since_millis` (inclusive) to the latest row, used by the alert
    /// orchestrator.
    fn get_recent_detections(
        &self,
        metric_name: &str,
        since_millis: i64,
    ) -> Result<Vec<DetectionRow>>;

    /// Upsert a metric registry row, keyed on `metric_name`.
    fn upsert_metric_config(&self, config: &MetricConfigRow) -> Result<usize>;

    fn get_metric_config(&self, metric_name: &str) -> Result<Option<MetricConfigRow>>;

    /// Attempt to acquire the lock named `(metric, detector_id,
    /// process_type)`. Succeeds iff no row is currently locked, or the
    /// existing row's timeout has elapsed (stale-lock takeover). Must
    /// behave as a compare-and-swap: concurrent acquirers see at most one
    /// winner.
    fn acquire_lock(
        &self,
        metric_name: &str,
        detector_id: &str,
        process_type: &str,
        timeout_seconds: i64,
        now_millis: i64,
    ) -> Result<bool>;

    /// Inspect the current lock state without attempting to acquire it.
    fn check_lock(
        &self,
        metric_name: &str,
        detector_id: &str,
        process_type: &str,
        now_millis: i64,
    ) -> Result<Option<LockInfo>>;

    /// Update the watermark of an in-progress task without releasing it.
    fn update_task_progress(
        &self,
        metric_name: &str,
        detector_id: &str,
        process_type: &str,
        last_processed_timestamp_millis: i64,
        now_millis: i64,
    ) -> Result<()>;

    /// Release the lock, transitioning it to a terminal status.
    #[allow(clippy::too_many_arguments)]
    fn release_lock(
        &self,
        metric_name: &str,
        detector_id: &str,
        process_type: &str,
        status: TaskStatus,
        last_processed_timestamp_millis: Option<i64>,
        error_message: Option<String>,
        now_millis: i64,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TaskKey {
    metric_name: String,
    detector_id: String,
    process_type: String,
}

impl TaskKey {
    fn new(metric_name: &str, detector_id: &str, process_type: &str) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            detector_id: detector_id.to_string(),
            process_type: process_type.to_string(),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    datapoints: HashMap<(String, i64), Datapoint>,
    detections: HashMap<(String, String, i64), DetectionRow>,
    tasks: HashMap<TaskKey, TaskRow>,
    metrics: HashMap<String, MetricConfigRow>,
}

/// In-memory `InternalStore`. Suitable for tests and as a single-process
/// development backend; every operation is guarded by one mutex so the
/// lock quartet is trivially a compare-and-swap.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InternalStore for MemoryStore {
    fn ensure_tables(&self) -> Result<()> {
        Ok(())
    }

    fn save_datapoints(&self, datapoints: &[Datapoint]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let mut written = 0;
        for dp in datapoints {
            let key = (dp.metric_name.clone(), dp.timestamp_millis);
            match state.datapoints.get(&key) {
                Some(existing) if existing.created_at_millis >= dp.created_at_millis => {
                    // Newer or equal row already present: superseded write,
                    // replacing-merge semantics.
                }
                _ => {
                    state.datapoints.insert(key, dp.clone());
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    fn save_detections(&self, detections: &[DetectionRow]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let mut written = 0;
        for row in detections {
            let key = (
                row.metric_name.clone(),
                row.detector_id.clone(),
                row.timestamp_millis,
            );
            match state.detections.get(&key) {
                Some(existing) if existing.created_at_millis >= row.created_at_millis => {}
                _ => {
                    state.detections.insert(key, row.clone());
                    written += 1;
                }
            }
        }
        Ok(written)
    }

    fn get_last_datapoint_timestamp(&self, metric_name: &str) -> Result<Option<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .datapoints
            .values()
            .filter(|dp| dp.metric_name == metric_name)
            .map(|dp| dp.timestamp_millis)
            .max())
    }

    fn get_recent_detections(
        &self,
        metric_name: &str,
        since_millis: i64,
    ) -> Result<Vec<DetectionRow>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<DetectionRow> = state
            .detections
            .values()
            .filter(|d| d.metric_name == metric_name && d.timestamp_millis >= since_millis)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.timestamp_millis);
        Ok(rows)
    }

    fn get_datapoints_tail(
        &self,
        metric_name: &str,
        before_millis: i64,
        limit: usize,
    ) -> Result<Vec<Datapoint>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<Datapoint> = state
            .datapoints
            .values()
            .filter(|dp| dp.metric_name == metric_name && dp.timestamp_millis <= before_millis)
            .cloned()
            .collect();
        rows.sort_by_key(|dp| dp.timestamp_millis);
        if rows.len() > limit {
            rows.drain(0..rows.len() - limit);
        }
        Ok(rows)
    }

    fn upsert_metric_config(&self, config: &MetricConfigRow) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state
            .metrics
            .insert(config.metric_name.clone(), config.clone());
        Ok(1)
    }

    fn get_metric_config(&self, metric_name: &str) -> Result<Option<MetricConfigRow>> {
        let state = self.state.lock().unwrap();
        Ok(state.metrics.get(metric_name).cloned())
    }

    fn acquire_lock(
        &self,
        metric_name: &str,
        detector_id: &str,
        process_type: &str,
        timeout_seconds: i64,
        now_millis: i64,
    ) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let key = TaskKey::new(metric_name, detector_id, process_type);

        let can_acquire = match state.tasks.get(&key) {
            None => true,
            Some(existing) => !existing.is_locked(now_millis),
        };

        if !can_acquire {
            return Ok(false);
        }

        state.tasks.insert(
            key,
            TaskRow {
                metric_name: metric_name.to_string(),
                detector_id: detector_id.to_string(),
                process_type: process_type.to_string(),
                status: TaskStatus::Running,
                started_at_millis: now_millis,
                updated_at_millis: now_millis,
                last_processed_timestamp_millis: None,
                error_message: None,
                timeout_seconds,
                last_alert_sent_millis: None,
                alert_count: 0,
            },
        );
        Ok(true)
    }

    fn check_lock(
        &self,
        metric_name: &str,
        detector_id: &str,
        process_type: &str,
        now_millis: i64,
    ) -> Result<Option<LockInfo>> {
        let state = self.state.lock().unwrap();
        let key = TaskKey::new(metric_name, detector_id, process_type);
        Ok(state.tasks.get(&key).map(|row| LockInfo {
            locked: row.is_locked(now_millis),
            locked_by: Some(format!("{metric_name}/{detector_id}/{process_type}")),
            started_at_millis: row.started_at_millis,
            timeout_seconds: row.timeout_seconds,
            status: row.status,
        }))
    }

    fn update_task_progress(
        &self,
        metric_name: &str,
        detector_id: &str,
        process_type: &str,
        last_processed_timestamp_millis: i64,
        now_millis: i64,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = TaskKey::new(metric_name, detector_id, process_type);
        if let Some(row) = state.tasks.get_mut(&key) {
            row.last_processed_timestamp_millis = Some(last_processed_timestamp_millis);
            row.updated_at_millis = now_millis;
        }
        Ok(())
    }

    fn release_lock(
        &self,
        metric_name: &str,
        detector_id: &str,
        process_type: &str,
        status: TaskStatus,
        last_processed_timestamp_millis: Option<i64>,
        error_message: Option<String>,
        now_millis: i64,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = TaskKey::new(metric_name, detector_id, process_type);
        if let Some(row) = state.tasks.get_mut(&key) {
            row.status = status;
            row.updated_at_millis = now_millis;
            if last_processed_timestamp_millis.is_some() {
                row.last_processed_timestamp_millis = last_processed_timestamp_millis;
            }
            row.error_message = error_message;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn dp(metric: &str, ts: i64, value: Option<f64>, created_at: i64) -> Datapoint {
        Datapoint {
            metric_name: metric.to_string(),
            timestamp_millis: ts,
            value,
            seasonality_data: "{}".to_string(),
            interval_seconds: 600,
            seasonality_columns: String::new(),
            created_at_millis: created_at,
        }
    }

    #[test]
    fn save_datapoints_drops_duplicate_keys_keeping_newest_created_at() {
        let store = MemoryStore::new();
        let written = store.save_datapoints(&[dp("m", 0, Some(1.0), 100)]).unwrap();
        assert_eq!(written, 1);

        // Older created_at for the same key: dropped.
        let written = store.save_datapoints(&[dp("m", 0, Some(2.0), 50)]).unwrap();
        assert_eq!(written, 0);

        // Newer created_at for the same key: replaces.
        let written = store.save_datapoints(&[dp("m", 0, Some(3.0), 200)]).unwrap();
        assert_eq!(written, 1);

        assert_eq!(store.get_last_datapoint_timestamp("m").unwrap(), Some(0));
    }

    #[test]
    fn get_last_datapoint_timestamp_is_max_across_rows() {
        let store = MemoryStore::new();
        store
            .save_datapoints(&[dp("m", 0, Some(1.0), 1), dp("m", 600_000, Some(2.0), 1)])
            .unwrap();
        assert_eq!(
            store.get_last_datapoint_timestamp("m").unwrap(),
            Some(600_000)
        );
    }

    #[test]
    fn concurrent_acquirers_have_exactly_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store
                    .acquire_lock("m", "pipeline", "pipeline", 3600, 1_000)
                    .unwrap()
            }));
        }
        let wins: usize = handles.into_iter().map(|h| h.join().unwrap()).filter(|&w| w).count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn stale_lock_is_taken_over_after_timeout_elapses() {
        let store = MemoryStore::new();
        assert!(store.acquire_lock("m", "pipeline", "pipeline", 10, 0).unwrap());
        // Still within timeout: second acquirer fails.
        assert!(!store.acquire_lock("m", "pipeline", "pipeline", 10, 5_000).unwrap());
        // Past timeout (10s = 10_000ms): exactly one subsequent acquirer succeeds.
        assert!(store.acquire_lock("m", "pipeline", "pipeline", 10, 11_000).unwrap());
    }

    #[test]
    fn release_then_reacquire_succeeds_immediately() {
        let store = MemoryStore::new();
        assert!(store.acquire_lock("m", "pipeline", "pipeline", 3600, 0).unwrap());
        store
            .release_lock("m", "pipeline", "pipeline", TaskStatus::Completed, None, None, 100)
            .unwrap();
        assert!(store.acquire_lock("m", "pipeline", "pipeline", 3600, 200).unwrap());
    }

    #[test]
    fn check_lock_reports_locked_by() {
        let store = MemoryStore::new();
        store.acquire_lock("m", "pipeline", "pipeline", 3600, 0).unwrap();
        let info = store.check_lock("m", "pipeline", "pipeline", 100).unwrap().unwrap();
        assert!(info.locked);
        assert_eq!(info.locked_by.as_deref(), Some("m/pipeline/pipeline"));
    }

    #[test]
    fn datapoints_tail_returns_last_n_ascending() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .save_datapoints(&[dp("m", i * 600_000, Some(i as f64), 1)])
                .unwrap();
        }
        let tail = store.get_datapoints_tail("m", 4 * 600_000, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].timestamp_millis, 3 * 600_000);
        assert_eq!(tail[1].timestamp_millis, 4 * 600_000);
    }

    #[test]
    fn datapoints_tail_respects_before_millis_cutoff() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store
                .save_datapoints(&[dp("m", i * 600_000, Some(i as f64), 1)])
                .unwrap();
        }
        let tail = store.get_datapoints_tail("m", 2 * 600_000, 10).unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail.last().unwrap().timestamp_millis, 2 * 600_000);
    }

    #[test]
    fn check_lock_none_for_unknown_metric() {
        let store = MemoryStore::new();
        assert!(store.check_lock("nope", "pipeline", "pipeline", 0).unwrap().is_none());
    }
}
