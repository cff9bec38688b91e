use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use tokio::task::JoinHandle;

use crate::collaborators::{ModelRuntime, OutcomeStore};
use crate::event::{EngineEvent, LearningResult};
use crate::model::{Outcome, Prediction};
use crate::registry::{ModelState, ModelWeightRegistry, ModelWeights};
use crate::runtime::EventBus;

#[derive(Debug, Clone, Copy)]
pub struct LearningSettings {
    /// Performance below this triggers online learning.
    pub threshold: f64,
    /// Capacity of each model's correctness window.
    pub window: usize,
    /// Lower bound on every blend weight.
    pub weight_floor: f64,
}

impl Default for LearningSettings {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            window: crate::registry::DEFAULT_PERFORMANCE_WINDOW,
            weight_floor: crate::registry::DEFAULT_WEIGHT_FLOOR,
        }
    }
}

/// What happened to one realized outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeReport {
    pub correct: bool,
    pub performance: f64,
    /// Set when the outcome pushed the model below threshold.
    pub learning: Option<LearningResult>,
}

/// Per-model results of one online-learning sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub results: BTreeMap<String, LearningResult>,
}

impl SweepReport {
    pub fn updated(&self) -> usize {
        self.results
            .values()
            .filter(|r| **r == LearningResult::Updated)
            .count()
    }
}

/// A prediction is correct only when its direction equals the outcome's.
///
/// Neutral is its own class: a neutral call is right only against a neutral
/// outcome, and a long/short call against a neutral outcome is wrong.
pub fn evaluate_prediction(prediction: &Prediction, outcome: &Outcome) -> bool {
    prediction.direction == outcome.direction
}

/// Scores outcomes, retrains underperforming models and owns blend weights.
///
/// The only writer of the [`ModelWeightRegistry`].
pub struct AdaptiveLearningController<M, S> {
    settings: LearningSettings,
    runtime: Arc<M>,
    store: Arc<S>,
    registry: Arc<ModelWeightRegistry>,
    bus: Arc<EventBus>,
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl<M: ModelRuntime, S: OutcomeStore + 'static> AdaptiveLearningController<M, S> {
    pub fn new(
        settings: LearningSettings,
        runtime: Arc<M>,
        store: Arc<S>,
        registry: Arc<ModelWeightRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            settings,
            runtime,
            store,
            registry,
            bus,
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> LearningSettings {
        self.settings
    }

    pub fn evaluate_prediction(&self, prediction: &Prediction, outcome: &Outcome) -> bool {
        evaluate_prediction(prediction, outcome)
    }

    /// Current accuracy of `model_id` (0.5 when nothing is known yet).
    pub fn calculate_current_performance(&self, model_id: &str) -> f64 {
        self.registry.performance(model_id)
    }

    pub fn model_state(&self, model_id: &str) -> ModelState {
        self.registry.state(model_id)
    }

    /// Seed or override a model's accuracy, e.g. from an offline evaluation.
    pub fn set_model_performance(&self, model_id: &str, performance: f64) {
        self.registry.set_performance(model_id, performance);
    }

    pub fn track_model(&self, model_id: &str) {
        self.registry.track(model_id);
    }

    /// Score `prediction` against `outcome` for the model that produced it.
    ///
    /// The outcome is written to the store in the background. Falling below
    /// threshold runs one learning cycle, after which the model is `Nominal`
    /// again whatever the cycle's result.
    pub async fn record_outcome(
        &self,
        prediction: &Prediction,
        outcome: &Outcome,
    ) -> OutcomeReport {
        self.persist(prediction, outcome);

        let model_id = prediction.source_id.as_str();
        let correct = evaluate_prediction(prediction, outcome);
        let performance = self.registry.record_result(model_id, correct);
        self.bus.emit(EngineEvent::OutcomeProcessed {
            model_id: model_id.to_string(),
            correct,
            performance,
            window_len: self.registry.window_len(model_id),
            timestamp_ms: outcome.timestamp_ms,
        });

        if performance >= self.settings.threshold {
            return OutcomeReport {
                correct,
                performance,
                learning: None,
            };
        }

        tracing::info!(
            model_id = %model_id,
            performance,
            threshold = self.settings.threshold,
            "Model underperforming, starting online learning"
        );
        self.mark_underperforming(model_id);
        let result = self.learn(model_id, ModelState::Nominal).await;
        self.update_ensemble_weights();
        OutcomeReport {
            correct,
            performance,
            learning: Some(result),
        }
    }

    /// Retrain every tracked model whose accuracy is below threshold.
    ///
    /// Models are processed concurrently; a failure or a missing batch for one
    /// model never affects the others, and leaves its state as it was before
    /// the sweep. Weights are recomputed afterwards.
    pub async fn perform_online_learning(&self) -> SweepReport {
        let candidates: Vec<(String, ModelState)> = self
            .registry
            .tracked_models()
            .into_iter()
            .filter(|id| self.registry.performance(id) < self.settings.threshold)
            .map(|id| {
                let before = self.registry.state(&id);
                (id, before)
            })
            .collect();

        for (id, _) in &candidates {
            self.mark_underperforming(id);
        }
        let results = join_all(candidates.iter().map(|(id, before)| async move {
            (id.clone(), self.learn(id, *before).await)
        }))
        .await;

        if !self.registry.tracked_models().is_empty() {
            self.update_ensemble_weights();
        }
        let report = SweepReport {
            results: results.into_iter().collect(),
        };
        tracing::info!(
            candidates = candidates.len(),
            updated = report.updated(),
            "Online learning sweep finished"
        );
        report
    }

    /// Weight ∝ accuracy, floored then normalized; notifies subscribers.
    pub fn update_ensemble_weights(&self) -> ModelWeights {
        let weights = self.registry.recompute_weights(self.settings.weight_floor);
        tracing::debug!(weights = ?weights, "Ensemble weights updated");
        self.bus.emit(EngineEvent::WeightsUpdated {
            weights: weights.clone(),
        });
        weights
    }

    pub fn get_model_weights(&self) -> ModelWeights {
        self.registry.weights_snapshot()
    }

    /// Clear windows, accuracy, weights and states.
    ///
    /// Cycles still in flight finish without writing their state back.
    pub fn reset(&self) {
        self.registry.reset();
        tracing::info!("Learning state reset");
    }

    /// Wait for every background outcome write started so far.
    pub async fn flush_pending_writes(&self) {
        let handles = std::mem::take(&mut *self.lock_pending());
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Outcome write task failed");
            }
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending_writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, prediction: &Prediction, outcome: &Outcome) {
        let store = self.store.clone();
        let prediction = prediction.clone();
        let outcome = *outcome;
        let handle = tokio::spawn(async move {
            if let Err(e) = store.record_outcome(&prediction, &outcome).await {
                tracing::warn!(
                    model_id = %prediction.source_id,
                    error = %e,
                    "Failed to persist outcome"
                );
            }
        });
        let mut pending = self.lock_pending();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    fn mark_underperforming(&self, model_id: &str) {
        if self.registry.state(model_id) == ModelState::Nominal {
            self.registry.set_state(model_id, ModelState::Underperforming);
        }
    }

    /// One learning cycle for `model_id`.
    ///
    /// A successful update resets the model to `Nominal`; any other result
    /// leaves it in `otherwise`.
    async fn learn(&self, model_id: &str, otherwise: ModelState) -> LearningResult {
        let Some((_, generation)) = self.registry.begin_retraining(model_id) else {
            tracing::debug!(model_id = %model_id, "Retraining already in flight, skipping");
            return LearningResult::SkippedInFlight;
        };

        let (result, samples) = match self.store.prepare_training_data(model_id).await {
            Err(e) => {
                tracing::warn!(model_id = %model_id, error = %e, "Failed to prepare training data");
                (LearningResult::Failed, 0)
            }
            Ok(batch) if batch.is_empty() => {
                tracing::debug!(model_id = %model_id, "No new training data, skipping");
                (LearningResult::SkippedNoData, 0)
            }
            Ok(batch) => match self.runtime.update_model(model_id, &batch).await {
                Ok(true) => (LearningResult::Updated, batch.len()),
                Ok(false) => {
                    tracing::warn!(model_id = %model_id, "Model runtime declined update");
                    (LearningResult::Rejected, batch.len())
                }
                Err(e) => {
                    tracing::warn!(
                        model_id = %model_id,
                        error = %e,
                        "Model update failed, will retry next sweep"
                    );
                    (LearningResult::Failed, batch.len())
                }
            },
        };

        let next = if result == LearningResult::Updated {
            ModelState::Nominal
        } else {
            otherwise
        };
        if !self.registry.finish_retraining(model_id, generation, next) {
            tracing::debug!(model_id = %model_id, "Registry reset mid-cycle, state dropped");
        }
        self.bus.emit(EngineEvent::LearningComplete {
            model_id: model_id.to_string(),
            result,
            samples,
            performance: self.registry.performance(model_id),
        });
        result
    }
}
