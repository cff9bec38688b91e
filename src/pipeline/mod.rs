pub mod cache;
pub mod history;
pub mod quality;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;

use crate::collaborators::{FeaturePipeline, ModelRuntime};
use crate::ensemble::{combine, ModelRole, RolePriors};
use crate::error::{EngineError, EngineResult};
use crate::event::EngineEvent;
use crate::model::{MarketData, Prediction, PredictionMetadata, ENSEMBLE_SOURCE_ID};
use crate::registry::ModelWeightRegistry;
use crate::runtime::EventBus;

pub use cache::{cache_key, PredictionCache};
pub use history::{HistoryEntry, PredictionHistory, DEFAULT_HISTORY_CAPACITY};
pub use quality::{assess, completeness, freshness, wall_clock_ms, DataQuality};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub roles: Vec<ModelRole>,
    /// Minimum responding models; fewer fails the request.
    pub min_quorum: usize,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub history_capacity: usize,
    /// Age at which an observation's freshness reaches 0.
    pub max_age_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            roles: ModelRole::ALL.to_vec(),
            min_quorum: 2,
            cache_ttl: Duration::from_secs(5),
            cache_max_entries: 1024,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_age_ms: 60_000,
        }
    }
}

/// Request path: cache → features → models → combine → history/notify.
pub struct PredictionPipeline<F, M> {
    settings: PipelineSettings,
    features: Arc<F>,
    runtime: Arc<M>,
    registry: Arc<ModelWeightRegistry>,
    priors: RolePriors,
    cache: PredictionCache,
    history: Mutex<PredictionHistory>,
    bus: Arc<EventBus>,
}

impl<F: FeaturePipeline, M: ModelRuntime> PredictionPipeline<F, M> {
    pub fn new(
        settings: PipelineSettings,
        features: Arc<F>,
        runtime: Arc<M>,
        registry: Arc<ModelWeightRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            cache: PredictionCache::new(settings.cache_ttl, settings.cache_max_entries),
            history: Mutex::new(PredictionHistory::with_capacity(settings.history_capacity)),
            priors: RolePriors::default(),
            settings,
            features,
            runtime,
            registry,
            bus,
        }
    }

    pub fn with_priors(mut self, priors: RolePriors) -> Self {
        self.priors = priors;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn cache(&self) -> &PredictionCache {
        &self.cache
    }

    /// Model instance ids queried for `instrument`.
    pub fn model_ids(&self, instrument: &str) -> Vec<String> {
        self.settings
            .roles
            .iter()
            .map(|role| role.model_id(instrument))
            .collect()
    }

    pub async fn generate_prediction(&self, market: &MarketData) -> EngineResult<Arc<Prediction>> {
        let key = cache_key(market);
        self.cache
            .get_or_try_compute(&key, || self.compute(market))
            .await
    }

    pub fn history(&self, instrument: &str) -> Vec<HistoryEntry> {
        self.lock_history().entries(instrument)
    }

    pub fn latest_prediction_at_or_before(
        &self,
        instrument: &str,
        timestamp_ms: u64,
    ) -> Option<Arc<Prediction>> {
        self.lock_history().latest_at_or_before(instrument, timestamp_ms)
    }

    /// Latest unscored prediction at or before `timestamp_ms`, marked as
    /// scored. Each history entry is handed out at most once.
    pub fn claim_prediction_for_outcome(
        &self,
        instrument: &str,
        timestamp_ms: u64,
    ) -> Option<Arc<Prediction>> {
        self.lock_history().claim_unresolved(instrument, timestamp_ms)
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, PredictionHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn compute(&self, market: &MarketData) -> EngineResult<Arc<Prediction>> {
        let instrument = market.instrument_key();
        let features = match self.features.extract_features(market).await {
            Ok(Some(features)) if !features.is_empty() => features,
            Ok(_) => {
                return Err(EngineError::FeatureExtraction {
                    instrument,
                    reason: "pipeline returned no features".to_string(),
                })
            }
            Err(e) => {
                return Err(EngineError::FeatureExtraction {
                    instrument,
                    reason: format!("{:#}", e),
                })
            }
        };

        let now_ms = wall_clock_ms();
        let timestamp_ms = market.timestamp_ms.unwrap_or(now_ms);
        let model_ids = self.model_ids(&instrument);
        let responses = join_all(model_ids.iter().map(|id| {
            let features = &features;
            async move { (id, self.runtime.predict(id, features).await) }
        }))
        .await;

        let mut components: BTreeMap<String, Prediction> = BTreeMap::new();
        let mut failed_models = Vec::new();
        let mut first_failure: Option<(String, String)> = None;
        for (id, response) in responses {
            match response {
                Ok(output) => {
                    let mut p =
                        Prediction::from_model_output(id.clone(), &instrument, timestamp_ms, output);
                    p.metadata.features = Some(features.clone());
                    components.insert(id.clone(), p);
                }
                Err(e) => {
                    tracing::warn!(model_id = %id, error = %e, "Model prediction failed");
                    failed_models.push(id.clone());
                    first_failure.get_or_insert_with(|| (id.clone(), format!("{:#}", e)));
                }
            }
        }

        if components.is_empty() {
            let (model_id, reason) = first_failure.unwrap_or_else(|| {
                (instrument.clone(), "no models configured".to_string())
            });
            return Err(EngineError::ModelUnavailable { model_id, reason });
        }
        let required = self.settings.min_quorum.clamp(1, model_ids.len().max(1));
        if components.len() < required {
            return Err(EngineError::QuorumNotMet {
                instrument,
                available: components.len(),
                required,
            });
        }

        let responding: Vec<String> = components.keys().cloned().collect();
        let weights = self.registry.weights_for(&responding).unwrap_or_else(|| {
            self.priors.call_weights(
                components
                    .iter()
                    .map(|(id, p)| (id.as_str(), p.confidence)),
            )
        });
        let signal = combine(&components, &weights);
        let quality = assess(market, now_ms, self.settings.max_age_ms);

        let prediction = Arc::new(Prediction {
            source_id: ENSEMBLE_SOURCE_ID.to_string(),
            instrument: instrument.clone(),
            timestamp_ms,
            direction: signal.direction,
            strength: signal.strength,
            confidence: signal.confidence,
            metadata: PredictionMetadata {
                freshness: Some(quality.freshness),
                completeness: Some(quality.completeness),
                weights: signal.weights,
                failed_models,
                components: components.into_values().collect(),
                features: Some(features),
            },
            recommendation: signal.recommendation,
        });

        self.lock_history().push(prediction.clone());
        tracing::debug!(
            instrument = %instrument,
            direction = prediction.direction.as_i8(),
            strength = prediction.strength,
            confidence = prediction.confidence,
            recommendation = prediction.recommendation.as_str(),
            degraded = !prediction.metadata.failed_models.is_empty(),
            "Prediction produced"
        );
        self.bus.emit(EngineEvent::PredictionProduced {
            instrument,
            prediction: prediction.clone(),
            timestamp_ms,
        });
        Ok(prediction)
    }
}
