//! Data model and persistence boundary for detectk's internal tables.

pub mod error;
pub mod model;
pub mod store;

pub use error::{Result, StoreError};
pub use model::{
    AlertConditionsRow, Datapoint, DetectionRow, LockInfo, MetricConfigRow, TaskRow, TaskStatus,
};
pub use store::{InternalStore, MemoryStore};
