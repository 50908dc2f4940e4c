//! Error types for configuration parsing and validation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid metric configuration '{metric}': {reason}")]
    BadMetric { metric: String, reason: String },

    #[error("Invalid detector configuration: {0}")]
    BadDetector(#[from] detectk_core::CoreError),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}
