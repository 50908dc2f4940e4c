//! Incremental metric extraction: watermark resolution, query rendering,
//! grid alignment, gap-filling, and seasonality enrichment.

pub mod error;
pub mod gaps;
pub mod loader;
pub mod source;

pub use error::{LoaderError, Result};
pub use loader::{LoadedBundle, LoaderConfig, MetricLoader};
pub use source::{ExternalSource, SourceRow, StaticSource};
