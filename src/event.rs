use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::model::Prediction;

/// Why a learning cycle ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningResult {
    Updated,
    /// Runtime reported `false` for the update.
    Rejected,
    /// Not enough new training data yet.
    SkippedNoData,
    /// Another cycle for the same model was still running.
    SkippedInFlight,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    PredictionProduced {
        instrument: String,
        prediction: Arc<Prediction>,
        timestamp_ms: u64,
    },
    OutcomeProcessed {
        model_id: String,
        correct: bool,
        performance: f64,
        window_len: usize,
        timestamp_ms: u64,
    },
    LearningComplete {
        model_id: String,
        result: LearningResult,
        samples: usize,
        performance: f64,
    },
    WeightsUpdated {
        weights: BTreeMap<String, f64>,
    },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PredictionProduced { .. } => "prediction_produced",
            Self::OutcomeProcessed { .. } => "outcome_processed",
            Self::LearningComplete { .. } => "learning_complete",
            Self::WeightsUpdated { .. } => "weights_updated",
        }
    }
}
