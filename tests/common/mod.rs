#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use adaptive_ensemble::collaborators::{FeaturePipeline, ModelRuntime, OutcomeStore};
use adaptive_ensemble::model::{
    Direction, FeatureVector, MarketData, ModelOutput, Outcome, Prediction, TrainingBatch,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

pub fn market(instrument: &str, price: f64, timestamp_ms: u64) -> MarketData {
    MarketData::new(instrument, price, 1_000.0, timestamp_ms)
}

pub fn features() -> FeatureVector {
    FeatureVector::new()
        .with("ret_1", 0.001)
        .with("volatility", 0.01)
}

pub fn prediction(model_id: &str, direction: Direction) -> Prediction {
    Prediction::from_model_output(
        model_id,
        "ES",
        1_000,
        ModelOutput::new(direction, 0.8, 0.9),
    )
}

pub fn batch(rows: usize) -> TrainingBatch {
    let mut b = TrainingBatch::default();
    for i in 0..rows {
        b.push(features(), 1.0, i as u64);
    }
    b
}

/// Feature pipeline answering the same vector for every observation.
#[derive(Default)]
pub struct StaticFeatures {
    pub calls: AtomicUsize,
    pub fail: Mutex<bool>,
    pub empty: Mutex<bool>,
    pub delay: Mutex<Option<Duration>>,
}

impl StaticFeatures {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    pub fn set_empty(&self, empty: bool) {
        *self.empty.lock().unwrap() = empty;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl FeaturePipeline for StaticFeatures {
    async fn extract_features(&self, _market: &MarketData) -> Result<Option<FeatureVector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if *self.fail.lock().unwrap() {
            bail!("feature backend down");
        }
        if *self.empty.lock().unwrap() {
            return Ok(None);
        }
        Ok(Some(features()))
    }
}

/// How the scripted runtime answers `update_model`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpdateBehavior {
    Accept,
    Decline,
    Fail,
}

/// Model runtime answering per role suffix, with switchable failures.
pub struct ScriptedRuntime {
    outputs: Mutex<HashMap<String, ModelOutput>>,
    failing: Mutex<HashSet<String>>,
    update: Mutex<HashMap<String, UpdateBehavior>>,
    update_delay: Mutex<Option<Duration>>,
    pub predict_calls: AtomicUsize,
    pub updates: Mutex<Vec<(String, usize)>>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self {
            outputs: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            update: Mutex::new(HashMap::new()),
            update_delay: Mutex::new(None),
            predict_calls: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedRuntime {
    /// Every role answers LONG with the given strength and confidence.
    pub fn agreeing(strength: f64, confidence: f64) -> Self {
        let rt = Self::default();
        for role in ["LSTM", "TRANSFORMER", "RANDOM_FOREST", "XGBOOST"] {
            rt.answer(role, ModelOutput::new(Direction::Long, strength, confidence));
        }
        rt
    }

    /// Answer for every model id ending in `_{role}`.
    pub fn answer(&self, role: &str, output: ModelOutput) {
        self.outputs.lock().unwrap().insert(role.to_string(), output);
    }

    pub fn fail(&self, role: &str) {
        self.failing.lock().unwrap().insert(role.to_string());
    }

    pub fn set_update(&self, model_id: &str, behavior: UpdateBehavior) {
        self.update
            .lock()
            .unwrap()
            .insert(model_id.to_string(), behavior);
    }

    pub fn set_update_delay(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }

    pub fn predict_calls(&self) -> usize {
        self.predict_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<(String, usize)> {
        self.updates.lock().unwrap().clone()
    }

    fn role_of(model_id: &str) -> String {
        for role in ["RANDOM_FOREST", "TRANSFORMER", "XGBOOST", "LSTM"] {
            if model_id.ends_with(role) {
                return role.to_string();
            }
        }
        model_id.to_string()
    }
}

#[async_trait]
impl ModelRuntime for ScriptedRuntime {
    async fn predict(&self, model_id: &str, _features: &FeatureVector) -> Result<ModelOutput> {
        self.predict_calls.fetch_add(1, Ordering::SeqCst);
        let role = Self::role_of(model_id);
        if self.failing.lock().unwrap().contains(&role) {
            bail!("{} timed out", model_id);
        }
        self.outputs
            .lock()
            .unwrap()
            .get(&role)
            .copied()
            .ok_or_else(|| anyhow!("{} not deployed", model_id))
    }

    async fn update_model(&self, model_id: &str, batch: &TrainingBatch) -> Result<bool> {
        let delay = *self.update_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.updates
            .lock()
            .unwrap()
            .push((model_id.to_string(), batch.len()));
        let behavior = self
            .update
            .lock()
            .unwrap()
            .get(model_id)
            .copied()
            .unwrap_or(UpdateBehavior::Accept);
        match behavior {
            UpdateBehavior::Accept => Ok(true),
            UpdateBehavior::Decline => Ok(false),
            UpdateBehavior::Fail => bail!("trainer crashed for {}", model_id),
        }
    }
}

/// In-memory outcome store with per-model canned batches.
#[derive(Default)]
pub struct MemoryStore {
    pub recorded: Mutex<Vec<(Prediction, Outcome)>>,
    batches: Mutex<HashMap<String, TrainingBatch>>,
    fail_record: Mutex<bool>,
    record_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn set_batch(&self, model_id: &str, batch: TrainingBatch) {
        self.batches
            .lock()
            .unwrap()
            .insert(model_id.to_string(), batch);
    }

    pub fn set_fail_record(&self, fail: bool) {
        *self.fail_record.lock().unwrap() = fail;
    }

    pub fn set_record_delay(&self, delay: Duration) {
        *self.record_delay.lock().unwrap() = Some(delay);
    }

    pub fn recorded(&self) -> usize {
        self.recorded.lock().unwrap().len()
    }
}

#[async_trait]
impl OutcomeStore for MemoryStore {
    async fn record_outcome(&self, prediction: &Prediction, outcome: &Outcome) -> Result<()> {
        let delay = *self.record_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if *self.fail_record.lock().unwrap() {
            bail!("disk full");
        }
        self.recorded
            .lock()
            .unwrap()
            .push((prediction.clone(), *outcome));
        Ok(())
    }

    async fn prepare_training_data(&self, model_id: &str) -> Result<TrainingBatch> {
        Ok(self
            .batches
            .lock()
            .unwrap()
            .get(model_id)
            .cloned()
            .unwrap_or_default())
    }
}
