//! Error types for the detection core.

use thiserror::Error;

/// Result type for detection-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error types for the statistics kernel, detectors and query template.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A detector was constructed with invalid or inconsistent parameters.
    #[error("Invalid detector configuration: {0}")]
    BadConfig(String),

    /// The weighted statistics kernel was called with malformed input
    /// (mismatched lengths, weights not summing to 1, percentile out of
    /// range).
    #[error("Invalid input: {0}")]
    BadInput(String),

    /// Query template syntax error, or an undefined variable in strict mode.
    #[error("Invalid query template: {0}")]
    BadTemplate(String),

    /// An interval literal did not match the accepted grammar.
    #[error("Invalid interval literal: {0}")]
    BadInterval(String),
}

impl CoreError {
    /// Short machine-readable tag for the error kind, used in logging and
    /// in task manager reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::BadConfig(_) => "bad_config",
            CoreError::BadInput(_) => "bad_input",
            CoreError::BadTemplate(_) => "bad_template",
            CoreError::BadInterval(_) => "bad_interval",
        }
    }
}
