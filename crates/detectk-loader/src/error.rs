//! Error types for the metric loader.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoaderError>;

#[derive(Error, Debug)]
pub enum LoaderError {
    /// Loader asked to resume without a saved watermark and without an
    /// explicit `from` argument.
    #[error("no watermark saved for metric '{0}' and no from_date provided")]
    NoWatermark(String),

    /// Query rendering failed (template syntax, or an undefined variable
    /// in strict mode).
    #[error("query template error: {0}")]
    BadTemplate(#[from] detectk_core::CoreError),

    /// The external source's result set is missing a required column.
    #[error("query result missing required column '{0}'")]
    BadSchema(String),

    /// Invalid loader configuration (e.g. an unrecognized display timezone).
    #[error("invalid loader configuration: {0}")]
    BadConfig(String),

    /// External source or internal store I/O failure.
    #[error("data source error: {0}")]
    Transient(String),

    #[error("storage error: {0}")]
    Store(#[from] detectk_store::StoreError),
}
