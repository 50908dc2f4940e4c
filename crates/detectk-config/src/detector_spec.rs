//! Declarative, serde-deserializable form of a detector configuration.
//!
//! Mirrors `detectk_core::Detector`'s variants field-for-field; kept as a
//! separate tagged enum rather than deriving `Deserialize` directly on
//! the core type so the core crate stays free of a serde dependency on
//! its own sum type.

use serde::{Deserialize, Serialize};

use detectk_core::{Detector, IqrParams, MadParams, ManualBoundsParams, ZScoreParams};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorSpec {
    Mad {
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default = "default_window_size")]
        window_size: usize,
        #[serde(default = "default_min_samples")]
        min_samples: usize,
    },
    ZScore {
        #[serde(default = "default_threshold")]
        threshold: f64,
        #[serde(default = "default_window_size")]
        window_size: usize,
        #[serde(default = "default_min_samples")]
        min_samples: usize,
    },
    Iqr {
        #[serde(default = "default_iqr_threshold")]
        threshold: f64,
        #[serde(default = "default_window_size")]
        window_size: usize,
        #[serde(default = "default_min_samples")]
        min_samples: usize,
    },
    ManualBounds {
        lower_bound: Option<f64>,
        upper_bound: Option<f64>,
    },
}

fn default_threshold() -> f64 {
    3.0
}

fn default_iqr_threshold() -> f64 {
    1.5
}

fn default_window_size() -> usize {
    100
}

fn default_min_samples() -> usize {
    30
}

impl DetectorSpec {
    /// Build the runtime detector this spec describes, validating
    /// parameters at construction.
    pub fn build(&self) -> Result<Detector> {
        let detector = match self {
            DetectorSpec::Mad { threshold, window_size, min_samples } => Detector::mad(MadParams {
                threshold: *threshold,
                window_size: *window_size,
                min_samples: *min_samples,
            })?,
            DetectorSpec::ZScore { threshold, window_size, min_samples } => {
                Detector::zscore(ZScoreParams {
                    threshold: *threshold,
                    window_size: *window_size,
                    min_samples: *min_samples,
                })?
            }
            DetectorSpec::Iqr { threshold, window_size, min_samples } => Detector::iqr(IqrParams {
                threshold: *threshold,
                window_size: *window_size,
                min_samples: *min_samples,
            })?,
            DetectorSpec::ManualBounds { lower_bound, upper_bound } => {
                Detector::manual_bounds(ManualBoundsParams {
                    lower_bound: *lower_bound,
                    upper_bound: *upper_bound,
                })?
            }
        };
        Ok(detector)
    }
}
