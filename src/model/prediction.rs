use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::feature::FeatureVector;
use crate::model::signal::{Direction, Recommendation};

/// Source id stamped on combined predictions.
pub const ENSEMBLE_SOURCE_ID: &str = "ensemble";

/// Raw answer of one model for one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub direction: Direction,
    pub strength: f64,
    pub confidence: f64,
}

impl ModelOutput {
    pub fn new(direction: Direction, strength: f64, confidence: f64) -> Self {
        Self {
            direction,
            strength,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetadata {
    /// 1 for a brand-new observation, decaying to 0 at the staleness horizon.
    pub freshness: Option<f64>,
    /// Share of {price, volume, timestamp} present on the observation.
    pub completeness: Option<f64>,
    /// Weights actually applied, keyed by model id.
    pub weights: BTreeMap<String, f64>,
    /// Models that were queried but failed (degraded ensemble).
    pub failed_models: Vec<String>,
    /// Per-model predictions that fed the ensemble.
    pub components: Vec<Prediction>,
    pub features: Option<FeatureVector>,
}

/// A directional call. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub source_id: String,
    pub instrument: String,
    pub timestamp_ms: u64,
    pub direction: Direction,
    pub strength: f64,
    pub confidence: f64,
    pub metadata: PredictionMetadata,
    pub recommendation: Recommendation,
}

impl Prediction {
    /// Wrap a single model's output; strength and confidence are clipped.
    pub fn from_model_output(
        source_id: impl Into<String>,
        instrument: impl Into<String>,
        timestamp_ms: u64,
        output: ModelOutput,
    ) -> Self {
        let strength = clip_unit(output.strength.abs());
        let confidence = clip_unit(output.confidence);
        Self {
            source_id: source_id.into(),
            instrument: instrument.into(),
            timestamp_ms,
            direction: output.direction,
            strength,
            confidence,
            metadata: PredictionMetadata::default(),
            recommendation: Recommendation::from_parts(output.direction, strength, confidence),
        }
    }

    /// Strength carrying the direction's sign.
    pub fn signed_strength(&self) -> f64 {
        self.direction.as_f64() * self.strength
    }

    pub fn components(&self) -> &[Prediction] {
        &self.metadata.components
    }
}

pub(crate) fn clip_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
