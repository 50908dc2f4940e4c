//! End-to-end Load -> Detect -> Alert exercised against the in-memory
//! store and a fake external source.

use std::collections::BTreeMap;

use detectk_alert::DirectionMode;
use detectk_config::{AlertConditionsSpec, AlertingSpec, ChannelSpec, DetectorSpec, MetricConfig};
use detectk_core::{Interval, TemplateMode};
use detectk_loader::{SourceRow, StaticSource};
use detectk_store::{InternalStore, MemoryStore, TaskStatus};
use detectk_task::{TaskManager, ALL_STEPS};

fn config_with_alerting() -> MetricConfig {
    MetricConfig {
        metric_name: "checkout.errors".to_string(),
        path: "metrics/checkout_errors.yml".to_string(),
        query: "select timestamp, value from t where ts between {{ dtk_start_time }} and {{ dtk_end_time }}"
            .to_string(),
        interval: Interval::parse("1min").unwrap(),
        loading_batch_size: 1_000,
        seasonality_columns: vec![],
        timezone: "UTC".to_string(),
        template_mode: TemplateMode::Lenient,
        fill_gaps: true,
        detectors: vec![DetectorSpec::ManualBounds {
            lower_bound: Some(0.0),
            upper_bound: Some(50.0),
        }],
        alerting: Some(AlertingSpec {
            enabled: true,
            conditions: AlertConditionsSpec {
                min_detectors: 1,
                direction: DirectionMode::Any,
                consecutive_anomalies: 1,
            },
            channels: vec![ChannelSpec::Mattermost {
                webhook_url: "http://127.0.0.1:1/hooks/test".to_string(),
            }],
            message_template: None,
        }),
        enabled: true,
        tags: BTreeMap::new(),
        total_timeout_seconds: 3_600,
        detection_lookback_points: 500,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn full_pipeline_fires_an_alert_on_a_manual_bounds_violation() {
    init_tracing();
    let store = MemoryStore::new();
    store.ensure_tables().unwrap();

    let source = StaticSource::new(vec![
        SourceRow { timestamp_millis: 0, value: Some(10.0) },
        SourceRow { timestamp_millis: 60_000, value: Some(999.0) },
    ]);

    let manager = TaskManager::new(&store);
    let config = config_with_alerting();
    manager.register_metric(&config).unwrap();

    let report = manager.run_metric(
        &config,
        &source,
        &ALL_STEPS,
        Some(0),
        120_000,
        false,
        10_000_000,
    );

    assert_eq!(report.status, TaskStatus::Completed);
    assert_eq!(report.datapoints_loaded, 2);
    assert_eq!(report.anomalies_detected, 1);
    // The orchestrator fires regardless of whether the webhook transport
    // itself succeeds; channel failures are localized (see detectk-alert).
    assert_eq!(report.alerts_sent, 1);

    let status = manager.get_metric_status("checkout.errors", 10_000_001).unwrap();
    assert!(!status.is_locked);
    assert_eq!(status.last_datapoint_millis, Some(60_000));
}

#[test]
fn concurrent_runs_for_the_same_metric_serialize_through_the_lock() {
    let store = MemoryStore::new();
    let source = StaticSource::new(vec![SourceRow { timestamp_millis: 0, value: Some(1.0) }]);
    let manager = TaskManager::new(&store);
    let mut config = config_with_alerting();
    config.alerting = None;

    assert!(store
        .acquire_lock("checkout.errors", "pipeline", "pipeline", 3_600, 0)
        .unwrap());

    let report = manager.run_metric(&config, &source, &ALL_STEPS, Some(0), 60_000, false, 1_000);
    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(
        report.error.as_deref(),
        Some("Failed to acquire lock for metric 'checkout.errors'")
    );

    // The lock was never released by the failed acquirer; the original
    // holder's row is untouched and can still be released normally.
    store
        .release_lock(
            "checkout.errors",
            "pipeline",
            "pipeline",
            TaskStatus::Completed,
            None,
            None,
            2_000,
        )
        .unwrap();

    let report = manager.run_metric(&config, &source, &ALL_STEPS, Some(0), 60_000, false, 3_000);
    assert_eq!(report.status, TaskStatus::Completed);
}
