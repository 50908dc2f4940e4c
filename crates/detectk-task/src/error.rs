//! Error types for the task manager.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaskError>;

#[derive(Error, Debug)]
pub enum TaskError {
    /// Another run holds the pipeline lock and its timeout has not
    /// elapsed. Not retried; the next invocation is the unit of retry.
    #[error("Failed to acquire lock for metric '{0}'")]
    LockContention(String),

    /// The pipeline's total timeout elapsed mid-run.
    #[error("timeout")]
    Timeout,

    #[error("invalid metric configuration: {0}")]
    Config(#[from] detectk_config::ConfigError),

    #[error("detector error: {0}")]
    Core(#[from] detectk_core::CoreError),

    #[error("loader error: {0}")]
    Loader(#[from] detectk_loader::LoaderError),

    #[error("store error: {0}")]
    Store(#[from] detectk_store::StoreError),

    #[error("alert channel error: {0}")]
    Alert(#[from] detectk_alert::AlertError),
}
