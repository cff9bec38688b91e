use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::collaborators::{FeaturePipeline, ModelRuntime, OutcomeStore};
use crate::config::Config;
use crate::ensemble::RolePriors;
use crate::error::EngineResult;
use crate::event::EngineEvent;
use crate::learning::{AdaptiveLearningController, LearningSettings, OutcomeReport, SweepReport};
use crate::model::{MarketData, Outcome, Prediction};
use crate::pipeline::{HistoryEntry, PipelineSettings, PredictionPipeline};
use crate::registry::{ModelWeightRegistry, ModelWeights};
use crate::runtime::{spawn_learning_sweep, EventBus};

/// Wires the request path and the learning loop around one shared registry.
pub struct AdaptiveEngine<F, M, S> {
    registry: Arc<ModelWeightRegistry>,
    bus: Arc<EventBus>,
    pipeline: PredictionPipeline<F, M>,
    controller: Arc<AdaptiveLearningController<M, S>>,
}

impl<F, M, S> AdaptiveEngine<F, M, S>
where
    F: FeaturePipeline,
    M: ModelRuntime + 'static,
    S: OutcomeStore + 'static,
{
    pub fn new(
        pipeline: PipelineSettings,
        learning: LearningSettings,
        features: Arc<F>,
        runtime: Arc<M>,
        store: Arc<S>,
    ) -> Self {
        let registry = Arc::new(ModelWeightRegistry::new(learning.window));
        let bus = Arc::new(EventBus::new());
        let controller = Arc::new(AdaptiveLearningController::new(
            learning,
            runtime.clone(),
            store,
            registry.clone(),
            bus.clone(),
        ));
        let pipeline =
            PredictionPipeline::new(pipeline, features, runtime, registry.clone(), bus.clone());
        Self {
            registry,
            bus,
            pipeline,
            controller,
        }
    }

    pub fn from_config(
        config: &Config,
        features: Arc<F>,
        runtime: Arc<M>,
        store: Arc<S>,
    ) -> Result<Self> {
        Ok(Self::new(
            config.pipeline_settings()?,
            config.learning_settings(),
            features,
            runtime,
            store,
        ))
    }

    pub fn with_priors(mut self, priors: RolePriors) -> Self {
        self.pipeline = self.pipeline.with_priors(priors);
        self
    }

    pub fn registry(&self) -> &Arc<ModelWeightRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &PredictionPipeline<F, M> {
        &self.pipeline
    }

    pub fn controller(&self) -> &Arc<AdaptiveLearningController<M, S>> {
        &self.controller
    }

    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<EngineEvent> {
        self.bus.subscribe(capacity)
    }

    pub async fn generate_prediction(&self, market: &MarketData) -> EngineResult<Arc<Prediction>> {
        self.pipeline.generate_prediction(market).await
    }

    /// Score one model prediction against its realized outcome.
    pub async fn record_outcome(
        &self,
        prediction: &Prediction,
        outcome: &Outcome,
    ) -> OutcomeReport {
        self.controller.record_outcome(prediction, outcome).await
    }

    /// Pair `outcome` with the latest ensemble prediction for `instrument`
    /// made at or before it, and score every component model of that call.
    ///
    /// A prediction is scored once; when the latest one was already paired
    /// with an earlier outcome nothing is scored. Returns how many model
    /// predictions were scored.
    pub async fn resolve_outcome(&self, instrument: &str, outcome: &Outcome) -> usize {
        let Some(prediction) = self
            .pipeline
            .claim_prediction_for_outcome(instrument, outcome.timestamp_ms)
        else {
            tracing::debug!(
                instrument = %instrument,
                timestamp_ms = outcome.timestamp_ms,
                "No unscored prediction to pair with outcome"
            );
            return 0;
        };
        let mut scored = 0;
        for component in prediction.components() {
            self.controller.record_outcome(component, outcome).await;
            scored += 1;
        }
        scored
    }

    pub async fn perform_online_learning(&self) -> SweepReport {
        self.controller.perform_online_learning().await
    }

    pub fn update_ensemble_weights(&self) -> ModelWeights {
        self.controller.update_ensemble_weights()
    }

    pub fn get_model_weights(&self) -> ModelWeights {
        self.controller.get_model_weights()
    }

    /// Wait for outcome writes still running in the background.
    pub async fn flush_pending_writes(&self) {
        self.controller.flush_pending_writes().await;
    }

    /// Forget all learning state and every cached prediction.
    pub fn reset(&self) {
        self.controller.reset();
        self.pipeline.cache().clear();
    }

    pub fn history(&self, instrument: &str) -> Vec<HistoryEntry> {
        self.pipeline.history(instrument)
    }

    pub fn spawn_learning_sweep(
        &self,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        spawn_learning_sweep(self.controller.clone(), interval, shutdown)
    }
}
