//! Typed metric and detector-pipeline configuration.
//!
//! This is *not* a CLI or file-format parser (those stay out of scope);
//! it is the serde-deserializable surface the rest of the workspace
//! consumes, analogous to how the teacher crate takes typed
//! `ForecastOptions` rather than parsing anything itself.

pub mod alerting;
pub mod detector_spec;
pub mod error;
pub mod metric;

pub use alerting::{AlertConditionsSpec, AlertingSpec, ChannelSpec};
pub use detector_spec::DetectorSpec;
pub use error::{ConfigError, Result};
pub use metric::MetricConfig;
