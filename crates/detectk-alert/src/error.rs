//! Error types for alert orchestration and delivery.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AlertError>;

#[derive(Error, Debug)]
pub enum AlertError {
    /// A channel was constructed with invalid or missing configuration
    /// (e.g. an empty webhook URL).
    #[error("Invalid channel configuration: {0}")]
    BadConfig(String),
}
