//! Seams to the systems the engine depends on but does not own.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{FeatureVector, MarketData, ModelOutput, Outcome, Prediction, TrainingBatch};

/// Turns raw observations into a named feature vector.
#[async_trait]
pub trait FeaturePipeline: Send + Sync {
    /// `Ok(None)` (or an empty vector) means "no features for this observation".
    async fn extract_features(&self, market: &MarketData) -> Result<Option<FeatureVector>>;
}

/// Owns the trained models.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn predict(&self, model_id: &str, features: &FeatureVector) -> Result<ModelOutput>;

    /// Incrementally retrain `model_id`; `Ok(false)` means the runtime declined.
    async fn update_model(&self, model_id: &str, batch: &TrainingBatch) -> Result<bool>;
}

/// Persists realized outcomes and assembles training batches from them.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn record_outcome(&self, prediction: &Prediction, outcome: &Outcome) -> Result<()>;

    /// An empty batch means there is not enough new data for `model_id` yet.
    async fn prepare_training_data(&self, model_id: &str) -> Result<TrainingBatch>;
}
