//! Core detection library for detectk.
//!
//! This crate provides the pure, deterministic parts of the anomaly
//! detection engine: the weighted statistics kernel, the interval model,
//! the detection-result record, the four statistical detectors, the
//! seasonality feature extractor, and the query template renderer. It
//! has no knowledge of persistence, scheduling, or alert delivery.

pub mod detection;
pub mod detectors;
pub mod error;
pub mod interval;
pub mod query_template;
pub mod seasonality;
pub mod stats;

pub use detection::{DetectionMetadata, DetectionResult, Direction, NoVerdictReason};
pub use detectors::{
    detector_id, DataBundle, Detector, DetectorBehavior, IqrParams, MadParams,
    ManualBoundsParams, ZScoreParams,
};
pub use error::{CoreError, Result};
pub use interval::Interval;
pub use query_template::{QueryTemplate, TemplateMode};
pub use seasonality::{
    extract_in_timezone, parse_timezone, validate_columns as validate_seasonality_columns,
    SeasonalityData, ALLOWED_FEATURES,
};
pub use chrono_tz::Tz;
pub use stats::{percentile, uniform_weights, weighted_mad, weighted_median, weighted_percentile};
