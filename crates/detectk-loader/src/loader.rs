//! Incremental metric extraction: resolve the watermark, render and run
//! the query, align to the grid, gap-fill, enrich with seasonality, and
//! persist.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use detectk_core::{validate_seasonality_columns, Interval, QueryTemplate, TemplateMode};
use detectk_store::{Datapoint, InternalStore};
use tracing::{debug, info};

use crate::error::{LoaderError, Result};
use crate::gaps::{bucket_to_grid, fill_gaps};
use crate::source::ExternalSource;

/// A loaded, grid-aligned, gap-filled, seasonality-enriched batch of
/// datapoints for one metric, ready to persist.
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub metric_name: String,
    pub interval: Interval,
    pub seasonality_columns: Vec<String>,
    pub rows: Vec<Datapoint>,
}

impl LoadedBundle {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Configuration for one metric's extraction: the rendered query
/// template, its grid interval, and the seasonality columns to compute.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub metric_name: String,
    pub query: String,
    pub interval: Interval,
    pub seasonality_columns: Vec<String>,
    pub template_mode: TemplateMode,
    pub fill_gaps: bool,
    /// Display timezone seasonality feature calendar fields are read
    /// from (spec §4.4: UTC unless configured otherwise).
    pub timezone: String,
}

/// Pulls datapoints for a single metric from an `ExternalSource` and
/// persists them through an `InternalStore`.
pub struct MetricLoader<'a> {
    source: &'a dyn ExternalSource,
    store: &'a dyn InternalStore,
}

impl<'a> MetricLoader<'a> {
    pub fn new(source: &'a dyn ExternalSource, store: &'a dyn InternalStore) -> Self {
        Self { source, store }
    }

    /// Resolve the extraction window's start: the caller's explicit
    /// `from_date` if given, else one interval past the last saved
    /// watermark, else `NoWatermark`.
    fn resolve_from(
        &self,
        config: &LoaderConfig,
        from_date: Option<i64>,
    ) -> Result<i64> {
        if let Some(from) = from_date {
            return Ok(from);
        }
        let last = self
            .store
            .get_last_datapoint_timestamp(&config.metric_name)?;
        match last {
            Some(ts) => Ok(ts + config.interval.seconds() * 1000),
            None => Err(LoaderError::NoWatermark(config.metric_name.clone())),
        }
    }

    /// Fetch datapoints for `[from, to)`, align to the grid, gap-fill,
    /// and enrich with seasonality. Does not persist.
    pub fn load(
        &self,
        config: &LoaderConfig,
        to_millis: i64,
        from_date: Option<i64>,
    ) -> Result<LoadedBundle> {
        validate_seasonality_columns(&config.seasonality_columns)
            .map_err(LoaderError::BadTemplate)?;
        let tz = detectk_core::parse_timezone(&config.timezone)
            .map_err(|e| LoaderError::BadConfig(e.to_string()))?;

        let from_millis = self.resolve_from(config, from_date)?;

        let template = QueryTemplate::new(config.template_mode);
        let start = millis_to_datetime(from_millis);
        let end = millis_to_datetime(to_millis);
        let rendered = template.render(
            &config.query,
            start,
            end,
            config.interval.seconds(),
            &serde_json::Map::new(),
        )?;

        debug!(metric = %config.metric_name, %rendered, "rendering extraction query");
        let source_rows = self.source.query(&rendered)?;

        let raw: Vec<(i64, Option<f64>)> = source_rows
            .into_iter()
            .map(|r| (r.timestamp_millis, r.value))
            .collect();

        let aligned: BTreeMap<i64, Option<f64>> = bucket_to_grid(&raw, config.interval);
        let filled = if config.fill_gaps {
            fill_gaps(&aligned, config.interval)
        } else {
            aligned.into_iter().collect()
        };

        let columns_joined = config.seasonality_columns.join(",");
        let now = 0; // stamped by the caller at persistence time

        let rows = filled
            .into_iter()
            .map(|(ts, value)| {
                let features =
                    detectk_core::extract_in_timezone(ts, &config.seasonality_columns, tz);
                Datapoint {
                    metric_name: config.metric_name.clone(),
                    timestamp_millis: ts,
                    value,
                    seasonality_data: detectk_core::seasonality::to_json_string(&features),
                    interval_seconds: config.interval.seconds(),
                    seasonality_columns: columns_joined.clone(),
                    created_at_millis: now,
                }
            })
            .collect();

        Ok(LoadedBundle {
            metric_name: config.metric_name.clone(),
            interval: config.interval,
            seasonality_columns: config.seasonality_columns.clone(),
            rows,
        })
    }

    /// Persist a loaded bundle, stamping every row with `created_at_millis`.
    /// No-op on an empty bundle.
    pub fn save(&self, bundle: &LoadedBundle, created_at_millis: i64) -> Result<usize> {
        if bundle.is_empty() {
            return Ok(0);
        }
        let stamped: Vec<Datapoint> = bundle
            .rows
            .iter()
            .cloned()
            .map(|mut row| {
                row.created_at_millis = created_at_millis;
                row
            })
            .collect();
        let written = self.store.save_datapoints(&stamped)?;
        info!(metric = %bundle.metric_name, written, "persisted datapoints");
        Ok(written)
    }

    /// Load and immediately persist, returning the number of rows written.
    pub fn load_and_save(
        &self,
        config: &LoaderConfig,
        to_millis: i64,
        from_date: Option<i64>,
        created_at_millis: i64,
    ) -> Result<usize> {
        let bundle = self.load(config, to_millis, from_date)?;
        self.save(&bundle, created_at_millis)
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
}
