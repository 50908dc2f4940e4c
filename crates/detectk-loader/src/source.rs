//! The minimum contract a metric's external analytical database must
//! satisfy: execute a rendered query and return rows carrying at least a
//! timestamp and a value.

use crate::error::{LoaderError, Result};

/// One row returned by an `ExternalSource` query.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub timestamp_millis: i64,
    pub value: Option<f64>,
}

/// Abstraction over the external analytical database. Implementations
/// execute `rendered_query` verbatim and surface rows; the loader does
/// not parse SQL or know anything about the concrete backend.
pub trait ExternalSource: Send + Sync {
    fn query(&self, rendered_query: &str) -> Result<Vec<SourceRow>>;
}

/// A pre-built source backed by an in-memory row set, for tests and
/// small deployments that precompute their own extraction.
pub struct StaticSource {
    rows: Vec<SourceRow>,
}

impl StaticSource {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows }
    }
}

impl ExternalSource for StaticSource {
    fn query(&self, _rendered_query: &str) -> Result<Vec<SourceRow>> {
        Ok(self.rows.clone())
    }
}

/// Parse generic column-named rows (as produced by a real SQL driver)
/// into `SourceRow`s, failing if either required column is absent from
/// the column list.
pub fn rows_from_columns(
    columns: &[String],
    rows: Vec<Vec<serde_json::Value>>,
) -> Result<Vec<SourceRow>> {
    let ts_idx = columns
        .iter()
        .position(|c| c == "timestamp")
        .ok_or_else(|| LoaderError::BadSchema("timestamp".to_string()))?;
    let val_idx = columns
        .iter()
        .position(|c| c == "value")
        .ok_or_else(|| LoaderError::BadSchema("value".to_string()))?;

    rows.into_iter()
        .map(|row| {
            let timestamp_millis = row
                .get(ts_idx)
                .and_then(|v| v.as_i64())
                .ok_or_else(|| LoaderError::BadSchema("timestamp".to_string()))?;
            let value = row.get(val_idx).and_then(|v| v.as_f64());
            Ok(SourceRow {
                timestamp_millis,
                value,
            })
        })
        .collect()
}
