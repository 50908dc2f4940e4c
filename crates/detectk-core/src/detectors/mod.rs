//! Detector common contract and the sum type over detector kinds.

mod iqr;
mod mad;
mod manual_bounds;
mod zscore;

pub use iqr::IqrParams;
pub use mad::MadParams;
pub use manual_bounds::ManualBoundsParams;
pub use zscore::ZScoreParams;

use serde_json::Value;

use crate::detection::DetectionResult;
use crate::error::Result;
use crate::seasonality::SeasonalityData;

/// Input bundle passed to a detector: one entry per input timestamp, in
/// the same order the detector must emit results in.
#[derive(Debug, Clone)]
pub struct DataBundle {
    pub timestamps_millis: Vec<i64>,
    pub values: Vec<Option<f64>>,
    pub seasonality_data: Vec<SeasonalityData>,
    pub seasonality_columns: Vec<String>,
}

impl DataBundle {
    pub fn len(&self) -> usize {
        self.timestamps_millis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps_millis.is_empty()
    }
}

/// Common behavior every detector kind implements: detection, and the
/// identity contract that names a detector configuration.
pub trait DetectorBehavior {
    /// Run detection over `bundle`, returning one result per input point,
    /// in input order.
    fn detect(&self, bundle: &DataBundle) -> Result<Vec<DetectionResult>>;

    /// Class tag disambiguating this detector kind from others with the
    /// same numeric parameters.
    fn class_tag(&self) -> &'static str;

    /// Non-default parameters as `(key, value, default_value)` triples.
    /// Implementors list every parameter; `canonical_params_json` drops
    /// the ones equal to their default.
    fn param_triples(&self) -> Vec<(&'static str, Value, Value)>;

    /// Canonical JSON of non-default parameters, sorted keys, compact
    /// separators. `"{}"` when every parameter is at its default.
    fn params_json(&self) -> String {
        canonical_params_json(&self.param_triples())
    }

    /// Deterministic 16-hex-character digest over `class_tag` and the
    /// canonical non-default parameter JSON.
    fn detector_id(&self) -> String {
        detector_id(self.class_tag(), &self.params_json())
    }
}

/// Build the canonical, sort-keyed, non-default-only parameter JSON.
fn canonical_params_json(triples: &[(&'static str, Value, Value)]) -> String {
    let mut map = std::collections::BTreeMap::new();
    for (key, value, default) in triples {
        if value != default {
            map.insert(key.to_string(), value.clone());
        }
    }
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}

/// Compute the 16-hex-character detector id from a class tag and the
/// canonical params JSON.
pub fn detector_id(class_tag: &str, params_json: &str) -> String {
    let input = format!("{class_tag}||{params_json}");
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex.as_str()[..16].to_string()
}

/// Sum type over the four detector kinds.
#[derive(Debug, Clone)]
pub enum Detector {
    Mad(mad::MadDetector),
    ZScore(zscore::ZScoreDetector),
    Iqr(iqr::IqrDetector),
    ManualBounds(manual_bounds::ManualBoundsDetector),
}

impl Detector {
    pub fn mad(params: MadParams) -> Result<Self> {
        Ok(Detector::Mad(mad::MadDetector::new(params)?))
    }

    pub fn zscore(params: ZScoreParams) -> Result<Self> {
        Ok(Detector::ZScore(zscore::ZScoreDetector::new(params)?))
    }

    pub fn iqr(params: IqrParams) -> Result<Self> {
        Ok(Detector::Iqr(iqr::IqrDetector::new(params)?))
    }

    pub fn manual_bounds(params: ManualBoundsParams) -> Result<Self> {
        Ok(Detector::ManualBounds(manual_bounds::ManualBoundsDetector::new(params)?))
    }
}

impl DetectorBehavior for Detector {
    fn detect(&self, bundle: &DataBundle) -> Result<Vec<DetectionResult>> {
        match self {
            Detector::Mad(d) => d.detect(bundle),
            Detector::ZScore(d) => d.detect(bundle),
            Detector::Iqr(d) => d.detect(bundle),
            Detector::ManualBounds(d) => d.detect(bundle),
        }
    }

    fn class_tag(&self) -> &'static str {
        match self {
            Detector::Mad(d) => d.class_tag(),
            Detector::ZScore(d) => d.class_tag(),
            Detector::Iqr(d) => d.class_tag(),
            Detector::ManualBounds(d) => d.class_tag(),
        }
    }

    fn param_triples(&self) -> Vec<(&'static str, Value, Value)> {
        match self {
            Detector::Mad(d) => d.param_triples(),
            Detector::ZScore(d) => d.param_triples(),
            Detector::Iqr(d) => d.param_triples(),
            Detector::ManualBounds(d) => d.param_triples(),
        }
    }
}

/// Collect up to `window_size` non-null values preceding index `i`
/// (exclusive), together with their seasonality data, returning `None`
/// if fewer than `min_samples` are available.
pub(crate) fn rolling_window<'a>(
    bundle: &'a DataBundle,
    i: usize,
    window_size: usize,
    min_samples: usize,
) -> Option<(Vec<f64>, Vec<&'a SeasonalityData>)> {
    let start = i.saturating_sub(window_size);
    let mut values = Vec::new();
    let mut seasonality = Vec::new();
    for j in start..i {
        if let Some(v) = bundle.values[j] {
            if v.is_finite() {
                values.push(v);
                seasonality.push(&bundle.seasonality_data[j]);
            }
        }
    }
    if values.len() < min_samples {
        None
    } else {
        Some((values, seasonality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_numeric_params_different_kind_get_different_ids() {
        let mad = Detector::mad(MadParams {
            threshold: 3.0,
            window_size: 100,
            min_samples: 30,
        })
        .unwrap();
        let zscore = Detector::zscore(ZScoreParams {
            threshold: 3.0,
            window_size: 100,
            min_samples: 30,
        })
        .unwrap();
        assert_ne!(mad.detector_id(), zscore.detector_id());
    }

    #[test]
    fn same_nondefault_params_produce_the_same_id() {
        let a = Detector::mad(MadParams {
            threshold: 2.5,
            window_size: 50,
            min_samples: 10,
        })
        .unwrap();
        let b = Detector::mad(MadParams {
            threshold: 2.5,
            window_size: 50,
            min_samples: 10,
        })
        .unwrap();
        assert_eq!(a.detector_id(), b.detector_id());
    }

    #[test]
    fn all_default_params_json_is_empty_object() {
        let d = Detector::mad(MadParams::default()).unwrap();
        assert_eq!(d.params_json(), "{}");
    }

    #[test]
    fn detector_id_is_16_lowercase_hex_chars() {
        let d = Detector::mad(MadParams::default()).unwrap();
        let id = d.detector_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
