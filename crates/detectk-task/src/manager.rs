//! The task manager: drives one metric's Load -> Detect -> Alert
//! pipeline behind the persistent lock of §5, aggregating a report and
//! propagating failures as `status = failed` rather than letting partial
//! progress read as success.

use std::fmt;

use detectk_alert::{
    get_last_complete_point, send_alerts, should_alert, AlertChannel, AlertConditions,
    DetectionRecord, MattermostChannel, WebhookChannel,
};
use detectk_config::{ChannelSpec, MetricConfig};
use detectk_core::{DetectorBehavior, Direction, SeasonalityData};
use detectk_loader::{ExternalSource, LoaderConfig, MetricLoader};
use detectk_store::{
    AlertConditionsRow, Datapoint, DetectionRow, InternalStore, MetricConfigRow, TaskStatus,
};
use tracing::{info, warn};

use crate::error::{Result, TaskError};

/// One stage of the per-metric pipeline, run in this fixed order when
/// requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Load,
    Detect,
    Alert,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStep::Load => "load",
            PipelineStep::Detect => "detect",
            PipelineStep::Alert => "alert",
        };
        f.write_str(s)
    }
}

/// The default, full pipeline: Load, then Detect, then Alert.
pub const ALL_STEPS: [PipelineStep; 3] =
    [PipelineStep::Load, PipelineStep::Detect, PipelineStep::Alert];

/// Outcome of one `run_metric` call. Silent partial success is not
/// permitted: if any step fails, `status` is `failed` even when earlier
/// steps already completed (`steps_completed` records that progress).
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub status: TaskStatus,
    pub steps_completed: Vec<PipelineStep>,
    pub datapoints_loaded: usize,
    pub anomalies_detected: usize,
    pub alerts_sent: usize,
    pub error: Option<String>,
}

impl PipelineReport {
    fn failed(steps_completed: Vec<PipelineStep>, error: String) -> Self {
        Self {
            status: TaskStatus::Failed,
            steps_completed,
            datapoints_loaded: 0,
            anomalies_detected: 0,
            alerts_sent: 0,
            error: Some(error),
        }
    }
}

/// Lock and watermark snapshot for one metric, as surfaced to operators.
#[derive(Debug, Clone)]
pub struct MetricStatus {
    pub metric_name: String,
    pub is_locked: bool,
    pub locked_by: Option<String>,
    pub last_datapoint_millis: Option<i64>,
}

const PIPELINE_PROCESS: &str = "pipeline";

/// Drives Load -> Detect -> Alert for one metric at a time, holding the
/// persistent pipeline lock for the run's duration.
pub struct TaskManager<'a> {
    store: &'a dyn InternalStore,
}

impl<'a> TaskManager<'a> {
    pub fn new(store: &'a dyn InternalStore) -> Self {
        Self { store }
    }

    /// Register (or update) a metric's configuration in the registry,
    /// normalizing its alerting fields the way `upsert_metric_config`
    /// is specified to.
    pub fn register_metric(&self, config: &MetricConfig) -> Result<usize> {
        config.validate()?;
        let row = to_metric_config_row(config);
        Ok(self.store.upsert_metric_config(&row)?)
    }

    /// Run `steps` (default: the full pipeline) for one metric, acquiring
    /// the pipeline lock unless `force` bypasses it. Every error inside
    /// the pipeline is caught here, recorded in the release, and
    /// returned in the report; `steps_completed` still enumerates
    /// whatever progress was made before the failure.
    #[allow(clippy::too_many_arguments)]
    pub fn run_metric(
        &self,
        config: &MetricConfig,
        source: &dyn ExternalSource,
        steps: &[PipelineStep],
        from_millis: Option<i64>,
        to_millis: i64,
        force: bool,
        now_millis: i64,
    ) -> PipelineReport {
        if !force {
            let acquired = match self.store.acquire_lock(
                &config.metric_name,
                PIPELINE_PROCESS,
                PIPELINE_PROCESS,
                config.total_timeout_seconds,
                now_millis,
            ) {
                Ok(acquired) => acquired,
                Err(e) => return PipelineReport::failed(vec![], e.to_string()),
            };
            if !acquired {
                let err = TaskError::LockContention(config.metric_name.clone());
                warn!(metric = %config.metric_name, "lock contention, run skipped");
                return PipelineReport::failed(vec![], err.to_string());
            }
        }
        info!(metric = %config.metric_name, force, "pipeline run starting");

        let outcome = self.run_steps(config, source, steps, from_millis, to_millis, now_millis);

        let (status, error_message, report) = match outcome {
            Ok(report) => (TaskStatus::Completed, None, report),
            Err((partial, e)) => {
                let msg = e.to_string();
                (TaskStatus::Failed, Some(msg.clone()), partial)
            }
        };

        if !force {
            if let Err(e) = self.store.release_lock(
                &config.metric_name,
                PIPELINE_PROCESS,
                PIPELINE_PROCESS,
                status,
                Some(to_millis),
                error_message.clone(),
                now_millis,
            ) {
                warn!(metric = %config.metric_name, error = %e, "failed to release pipeline lock");
            }
        }

        info!(
            metric = %config.metric_name,
            status = status.as_str(),
            steps_completed = report.steps_completed.len(),
            "pipeline run finished"
        );

        PipelineReport {
            status,
            error: error_message,
            ..report
        }
    }

    fn run_steps(
        &self,
        config: &MetricConfig,
        source: &dyn ExternalSource,
        steps: &[PipelineStep],
        from_millis: Option<i64>,
        to_millis: i64,
        now_millis: i64,
    ) -> std::result::Result<PipelineReport, (PipelineReport, TaskError)> {
        let mut steps_completed = Vec::new();
        let mut datapoints_loaded = 0usize;
        let mut anomalies_detected = 0usize;
        let mut alerts_sent = 0usize;

        if steps.contains(&PipelineStep::Load) {
            match self.run_load(config, source, from_millis, to_millis, now_millis) {
                Ok(written) => {
                    datapoints_loaded = written;
                    steps_completed.push(PipelineStep::Load);
                }
                Err(e) => {
                    return Err((
                        PipelineReport {
                            status: TaskStatus::Failed,
                            steps_completed,
                            datapoints_loaded,
                            anomalies_detected,
                            alerts_sent,
                            error: None,
                        },
                        e,
                    ))
                }
            }
        }

        if steps.contains(&PipelineStep::Detect) {
            match self.run_detect(config, to_millis, now_millis) {
                Ok(count) => {
                    anomalies_detected = count;
                    steps_completed.push(PipelineStep::Detect);
                }
                Err(e) => {
                    return Err((
                        PipelineReport {
                            status: TaskStatus::Failed,
                            steps_completed,
                            datapoints_loaded,
                            anomalies_detected,
                            alerts_sent,
                            error: None,
                        },
                        e,
                    ))
                }
            }
        }

        if steps.contains(&PipelineStep::Alert) && config.is_alert_enabled() {
            match self.run_alert(config, now_millis) {
                Ok(count) => {
                    alerts_sent = count;
                    steps_completed.push(PipelineStep::Alert);
                }
                Err(e) => {
                    return Err((
                        PipelineReport {
                            status: TaskStatus::Failed,
                            steps_completed,
                            datapoints_loaded,
                            anomalies_detected,
                            alerts_sent,
                            error: None,
                        },
                        e,
                    ))
                }
            }
        }

        Ok(PipelineReport {
            status: TaskStatus::Completed,
            steps_completed,
            datapoints_loaded,
            anomalies_detected,
            alerts_sent,
            error: None,
        })
    }

    fn run_load(
        &self,
        config: &MetricConfig,
        source: &dyn ExternalSource,
        from_millis: Option<i64>,
        to_millis: i64,
        now_millis: i64,
    ) -> Result<usize> {
        let loader = MetricLoader::new(source, self.store);
        let loader_config = LoaderConfig {
            metric_name: config.metric_name.clone(),
            query: config.query.clone(),
            interval: config.interval,
            seasonality_columns: config.seasonality_columns.clone(),
            template_mode: config.template_mode,
            fill_gaps: config.fill_gaps,
            timezone: config.timezone.clone(),
        };
        let written = loader.load_and_save(&loader_config, to_millis, from_millis, now_millis)?;
        Ok(written)
    }

    fn run_detect(&self, config: &MetricConfig, to_millis: i64, now_millis: i64) -> Result<usize> {
        let lookback = self
            .store
            .get_datapoints_tail(
                &config.metric_name,
                to_millis,
                config.detection_lookback_points as usize,
            )
            .map_err(TaskError::from)?;

        let bundle = build_bundle(&lookback, &config.seasonality_columns);
        let mut anomalies = 0usize;

        for spec in &config.detectors {
            let detector = spec.build()?;
            let results = detector.detect(&bundle)?;
            anomalies += results.iter().filter(|r| r.is_anomaly).count();

            let detector_id = detector.detector_id();
            let detector_params = detector.params_json();
            let rows: Vec<DetectionRow> = results
                .into_iter()
                .map(|r| DetectionRow {
                    metric_name: config.metric_name.clone(),
                    detector_id: detector_id.clone(),
                    timestamp_millis: r.timestamp_millis,
                    is_anomaly: r.is_anomaly,
                    confidence_lower: r.confidence_lower,
                    confidence_upper: r.confidence_upper,
                    value: r.value,
                    detector_params: detector_params.clone(),
                    detection_metadata: r.metadata.to_json().to_string(),
                    created_at_millis: now_millis,
                })
                .collect();
            self.store.save_detections(&rows).map_err(TaskError::from)?;
        }

        Ok(anomalies)
    }

    fn run_alert(&self, config: &MetricConfig, now_millis: i64) -> Result<usize> {
        let alerting = config
            .alerting
            .as_ref()
            .expect("caller checked is_alert_enabled");

        let mut conditions: AlertConditions = alerting.conditions.clone().into();
        conditions.display_timezone = config.timezone.clone();
        let last_complete = get_last_complete_point(now_millis, config.interval);
        let lookback_steps = conditions.min_detectors.max(conditions.consecutive_anomalies) as i64;
        let since_millis = last_complete - lookback_steps * config.interval.seconds() * 1000;

        let detector_names = detector_name_index(config);

        let records: Vec<DetectionRecord> = self
            .store
            .get_recent_detections(&config.metric_name, since_millis)
            .map_err(TaskError::from)?
            .into_iter()
            .filter(|row| row.timestamp_millis <= last_complete)
            .map(|row| to_detection_record(row, &detector_names))
            .collect();

        let (fire, payload) = should_alert(&config.metric_name, &conditions, &records);
        if !fire {
            return Ok(0);
        }
        let payload = payload.expect("should_alert returns a payload whenever it fires");

        let owned_channels: Vec<Box<dyn AlertChannel>> = alerting
            .channels
            .iter()
            .map(build_channel)
            .collect::<std::result::Result<_, _>>()
            .map_err(TaskError::from)?;
        let refs: Vec<(&str, &dyn AlertChannel)> = alerting
            .channels
            .iter()
            .zip(owned_channels.iter())
            .map(|(spec, channel)| (channel_label(spec), channel.as_ref()))
            .collect();

        let results = send_alerts(&payload, &refs, alerting.message_template.as_deref());
        for (name, ok) in &results {
            if !ok {
                warn!(metric = %config.metric_name, channel = %name, "alert delivery failed");
            }
        }

        Ok(1)
    }

    /// Lock and watermark snapshot for `metric_name`, without acquiring
    /// or releasing anything.
    pub fn get_metric_status(&self, metric_name: &str, now_millis: i64) -> Result<MetricStatus> {
        let lock = self
            .store
            .check_lock(metric_name, PIPELINE_PROCESS, PIPELINE_PROCESS, now_millis)
            .map_err(TaskError::from)?;
        let last_datapoint = self
            .store
            .get_last_datapoint_timestamp(metric_name)
            .map_err(TaskError::from)?;

        Ok(MetricStatus {
            metric_name: metric_name.to_string(),
            is_locked: lock.as_ref().map(|l| l.locked).unwrap_or(false),
            locked_by: lock.and_then(|l| l.locked_by),
            last_datapoint_millis: last_datapoint,
        })
    }
}

fn build_bundle(
    rows: &[Datapoint],
    seasonality_columns: &[String],
) -> detectk_core::DataBundle {
    let timestamps_millis = rows.iter().map(|r| r.timestamp_millis).collect();
    let values = rows.iter().map(|r| r.value).collect();
    let seasonality_data = rows
        .iter()
        .map(|r| serde_json::from_str::<SeasonalityData>(&r.seasonality_data).unwrap_or_default())
        .collect();
    detectk_core::DataBundle {
        timestamps_millis,
        values,
        seasonality_data,
        seasonality_columns: seasonality_columns.to_vec(),
    }
}

fn detector_name_index(config: &MetricConfig) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    for spec in &config.detectors {
        if let Ok(detector) = spec.build() {
            map.insert(detector.detector_id(), detector.class_tag().to_string());
        }
    }
    map
}

fn to_detection_record(
    row: DetectionRow,
    detector_names: &std::collections::HashMap<String, String>,
) -> DetectionRecord {
    let metadata: serde_json::Value =
        serde_json::from_str(&row.detection_metadata).unwrap_or(serde_json::Value::Null);
    let direction = match metadata.get("direction").and_then(|v| v.as_str()) {
        Some("above") => Direction::Above,
        Some("below") => Direction::Below,
        _ => Direction::None,
    };
    let severity = metadata.get("severity").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let detector_name = detector_names
        .get(&row.detector_id)
        .cloned()
        .unwrap_or_else(|| row.detector_id.clone());

    DetectionRecord {
        timestamp_millis: row.timestamp_millis,
        detector_name,
        detector_id: row.detector_id,
        value: row.value,
        is_anomaly: row.is_anomaly,
        confidence_lower: row.confidence_lower,
        confidence_upper: row.confidence_upper,
        direction,
        severity,
        detector_params: row.detector_params,
    }
}

fn channel_label(spec: &ChannelSpec) -> &'static str {
    match spec {
        ChannelSpec::Webhook { .. } => "webhook",
        ChannelSpec::Mattermost { .. } => "mattermost",
    }
}

fn build_channel(spec: &ChannelSpec) -> detectk_alert::Result<Box<dyn AlertChannel>> {
    match spec {
        ChannelSpec::Webhook { webhook_url, username } => {
            let channel = WebhookChannel::new(
                webhook_url.clone(),
                username.clone().unwrap_or_else(|| "detectk".to_string()),
            )?;
            Ok(Box::new(channel))
        }
        ChannelSpec::Mattermost { webhook_url } => {
            Ok(Box::new(MattermostChannel::new(webhook_url.clone())?))
        }
    }
}

fn to_metric_config_row(config: &MetricConfig) -> MetricConfigRow {
    let alert_conditions = config
        .alerting
        .as_ref()
        .map(|a| AlertConditionsRow {
            min_detectors: a.conditions.min_detectors,
            direction: direction_mode_str(a.conditions.direction).to_string(),
            consecutive_anomalies: a.conditions.consecutive_anomalies,
            no_data_alert: false,
        })
        .unwrap_or_default();

    MetricConfigRow {
        metric_name: config.metric_name.clone(),
        path: config.path.clone(),
        interval_seconds: config.interval.seconds(),
        loading_batch_size: config.loading_batch_size,
        is_alert_enabled: config.is_alert_enabled(),
        timezone: config.timezone.clone(),
        alert_conditions,
        enabled: config.enabled,
        tags: config.tags.clone(),
    }
}

fn direction_mode_str(mode: detectk_alert::DirectionMode) -> &'static str {
    use detectk_alert::DirectionMode;
    match mode {
        DirectionMode::Any => "any",
        DirectionMode::Same => "same",
        DirectionMode::Up => "up",
        DirectionMode::Down => "down",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detectk_config::DetectorSpec;
    use detectk_core::Interval;
    use detectk_loader::{SourceRow, StaticSource};
    use detectk_store::MemoryStore;
    use std::collections::BTreeMap;

    fn manual_bounds_config(metric: &str) -> MetricConfig {
        MetricConfig {
            metric_name: metric.to_string(),
            path: "test".to_string(),
            query: "select * from t where ts between {{ dtk_start_time }} and {{ dtk_end_time }}"
                .to_string(),
            interval: Interval::parse("10min").unwrap(),
            loading_batch_size: 1_000,
            seasonality_columns: vec![],
            timezone: "UTC".to_string(),
            template_mode: detectk_core::TemplateMode::Lenient,
            fill_gaps: true,
            detectors: vec![DetectorSpec::ManualBounds {
                lower_bound: Some(0.0),
                upper_bound: Some(100.0),
            }],
            alerting: None,
            enabled: true,
            tags: BTreeMap::new(),
            total_timeout_seconds: 3_600,
            detection_lookback_points: 500,
        }
    }

    #[test]
    fn full_pipeline_loads_detects_without_alerting() {
        let store = MemoryStore::new();
        let source = StaticSource::new(vec![
            SourceRow { timestamp_millis: 0, value: Some(10.0) },
            SourceRow { timestamp_millis: 600_000, value: Some(200.0) },
        ]);
        let manager = TaskManager::new(&store);
        let config = manual_bounds_config("m");

        let report = manager.run_metric(
            &config,
            &source,
            &ALL_STEPS,
            Some(0),
            1_200_000,
            false,
            10_000_000,
        );

        assert_eq!(report.status, TaskStatus::Completed);
        assert_eq!(report.datapoints_loaded, 2);
        assert_eq!(report.anomalies_detected, 1);
        assert_eq!(
            report.steps_completed,
            vec![PipelineStep::Load, PipelineStep::Detect]
        );
    }

    #[test]
    fn lock_contention_fails_without_releasing() {
        let store = MemoryStore::new();
        let source = StaticSource::new(vec![]);
        let manager = TaskManager::new(&store);
        let config = manual_bounds_config("m");

        assert!(store
            .acquire_lock("m", "pipeline", "pipeline", 3_600, 0)
            .unwrap());

        let report = manager.run_metric(&config, &source, &ALL_STEPS, Some(0), 0, false, 1_000);
        assert_eq!(report.status, TaskStatus::Failed);
        assert!(report.error.as_ref().unwrap().contains("Failed to acquire lock"));
        assert!(report.steps_completed.is_empty());
    }

    #[test]
    fn failed_load_reports_failed_status_with_no_steps_completed() {
        let store = MemoryStore::new();
        let source = StaticSource::new(vec![]);
        let manager = TaskManager::new(&store);
        let config = manual_bounds_config("m");

        // No watermark and no from_date: NoWatermark error on Load.
        let report = manager.run_metric(&config, &source, &ALL_STEPS, None, 600_000, false, 1_000);
        assert_eq!(report.status, TaskStatus::Failed);
        assert!(report.steps_completed.is_empty());
        assert!(report.error.is_some());
    }

    #[test]
    fn force_bypasses_locking_entirely() {
        let store = MemoryStore::new();
        let source = StaticSource::new(vec![SourceRow { timestamp_millis: 0, value: Some(1.0) }]);
        let manager = TaskManager::new(&store);
        let config = manual_bounds_config("m");

        assert!(store
            .acquire_lock("m", "pipeline", "pipeline", 3_600, 0)
            .unwrap());

        let report = manager.run_metric(&config, &source, &ALL_STEPS, Some(0), 600_000, true, 1_000);
        assert_eq!(report.status, TaskStatus::Completed);
    }

    #[test]
    fn metric_status_reports_lock_and_watermark() {
        let store = MemoryStore::new();
        let source = StaticSource::new(vec![SourceRow { timestamp_millis: 0, value: Some(1.0) }]);
        let manager = TaskManager::new(&store);
        let config = manual_bounds_config("m");

        manager.run_metric(&config, &source, &ALL_STEPS, Some(0), 600_000, false, 1_000);

        let status = manager.get_metric_status("m", 2_000).unwrap();
        assert!(!status.is_locked);
        assert_eq!(status.last_datapoint_millis, Some(0));
    }

    #[test]
    fn register_metric_upserts_the_registry_row() {
        let store = MemoryStore::new();
        let manager = TaskManager::new(&store);
        let config = manual_bounds_config("m");
        manager.register_metric(&config).unwrap();
        let row = store.get_metric_config("m").unwrap().unwrap();
        assert_eq!(row.metric_name, "m");
        assert_eq!(row.interval_seconds, 600);
    }
}
