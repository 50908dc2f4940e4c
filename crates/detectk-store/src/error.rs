//! Error types for the internal store boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed configuration row (metric registry upsert).
    #[error("Invalid metric configuration: {0}")]
    BadConfig(String),

    /// Backend I/O failure. The run that hit this ends failed; the next
    /// invocation is the unit of retry.
    #[error("Storage I/O error: {0}")]
    Io(String),
}
