pub mod weights;
pub mod window;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::ensemble::ModelRole;

pub use weights::{floor_and_normalize, normalize, DEFAULT_WEIGHT_FLOOR};
pub use window::{
    calculate_current_performance, PerformanceWindow, DEFAULT_PERFORMANCE_WINDOW,
    NO_INFORMATION_PERFORMANCE,
};

/// Snapshot of blend weights keyed by model id.
pub type ModelWeights = BTreeMap<String, f64>;

/// Learning state of one tracked model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelState {
    #[default]
    Nominal,
    Underperforming,
    Retraining,
}

#[derive(Debug, Default)]
struct RegistryState {
    windows: HashMap<String, PerformanceWindow>,
    performance: BTreeMap<String, f64>,
    weights: ModelWeights,
    states: BTreeMap<String, ModelState>,
    /// Bumped by every reset; in-flight retraining cycles compare against it.
    generation: u64,
}

impl RegistryState {
    fn tracked(&self) -> BTreeSet<String> {
        self.windows
            .keys()
            .chain(self.performance.keys())
            .chain(self.weights.keys())
            .chain(self.states.keys())
            .cloned()
            .collect()
    }
}

/// Performance-driven blend weights per deployed model instance.
///
/// Holds the rolling correctness windows, the derived accuracy per model, the
/// blend weights and the per-model learning state behind one lock, so every
/// reader sees a consistent snapshot. The lock is never held across an
/// `.await`.
#[derive(Debug)]
pub struct ModelWeightRegistry {
    window_capacity: usize,
    state: RwLock<RegistryState>,
}

impl Default for ModelWeightRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PERFORMANCE_WINDOW)
    }
}

impl ModelWeightRegistry {
    pub fn new(window_capacity: usize) -> Self {
        Self {
            window_capacity: window_capacity.max(1),
            state: RwLock::new(RegistryState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    /// Start tracking `model_id` without recording anything.
    pub fn track(&self, model_id: &str) {
        let mut st = self.write();
        st.states.entry(model_id.to_string()).or_default();
    }

    pub fn tracked_models(&self) -> Vec<String> {
        self.read().tracked().into_iter().collect()
    }

    /// Push one correctness flag and return the model's updated accuracy.
    pub fn record_result(&self, model_id: &str, correct: bool) -> f64 {
        let mut st = self.write();
        let capacity = self.window_capacity;
        let window = st
            .windows
            .entry(model_id.to_string())
            .or_insert_with(|| PerformanceWindow::with_capacity(capacity));
        window.push(correct);
        let perf = window.current_performance();
        st.performance.insert(model_id.to_string(), perf);
        st.states.entry(model_id.to_string()).or_default();
        perf
    }

    pub fn performance(&self, model_id: &str) -> f64 {
        self.read()
            .performance
            .get(model_id)
            .copied()
            .unwrap_or(NO_INFORMATION_PERFORMANCE)
    }

    pub fn set_performance(&self, model_id: &str, performance: f64) {
        let value = if performance.is_finite() {
            performance.clamp(0.0, 1.0)
        } else {
            NO_INFORMATION_PERFORMANCE
        };
        let mut st = self.write();
        st.performance.insert(model_id.to_string(), value);
        st.states.entry(model_id.to_string()).or_default();
    }

    pub fn performance_snapshot(&self) -> BTreeMap<String, f64> {
        self.read().performance.clone()
    }

    pub fn window_len(&self, model_id: &str) -> usize {
        self.read()
            .windows
            .get(model_id)
            .map(PerformanceWindow::len)
            .unwrap_or(0)
    }

    pub fn window(&self, model_id: &str) -> Option<PerformanceWindow> {
        self.read().windows.get(model_id).cloned()
    }

    pub fn weights_snapshot(&self) -> ModelWeights {
        self.read().weights.clone()
    }

    /// Registry weights for exactly `model_ids`, or `None` if any is missing.
    pub fn weights_for(&self, model_ids: &[String]) -> Option<ModelWeights> {
        let st = self.read();
        model_ids
            .iter()
            .map(|id| st.weights.get(id).map(|w| (id.clone(), *w)))
            .collect()
    }

    /// Recompute weights from current performance for every tracked model.
    ///
    /// Models are blended per instrument, so each instrument's group is
    /// floored and normalized on its own and sums to 1.
    pub fn recompute_weights(&self, floor: f64) -> ModelWeights {
        let mut st = self.write();
        let mut groups: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for id in st.tracked() {
            let perf = st
                .performance
                .get(&id)
                .copied()
                .unwrap_or(NO_INFORMATION_PERFORMANCE);
            groups
                .entry(ModelRole::instrument_of(&id).to_string())
                .or_default()
                .insert(id, perf);
        }
        st.weights = groups
            .values()
            .flat_map(|scores| floor_and_normalize(scores, floor))
            .collect();
        st.weights.clone()
    }

    /// Weights of the models tracked for `instrument`.
    pub fn instrument_weights(&self, instrument: &str) -> ModelWeights {
        let key = instrument.trim().to_ascii_uppercase();
        self.read()
            .weights
            .iter()
            .filter(|(id, _)| ModelRole::instrument_of(id).eq_ignore_ascii_case(&key))
            .map(|(id, w)| (id.clone(), *w))
            .collect()
    }

    pub fn state(&self, model_id: &str) -> ModelState {
        self.read()
            .states
            .get(model_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_state(&self, model_id: &str, state: ModelState) {
        self.write().states.insert(model_id.to_string(), state);
    }

    /// Move `model_id` into `Retraining` unless it is already there.
    ///
    /// Returns the state it left, or `None` when a retraining cycle for the
    /// model is already in flight.
    pub fn try_begin_retraining(&self, model_id: &str) -> Option<ModelState> {
        self.begin_retraining(model_id).map(|(previous, _)| previous)
    }

    /// Like [`Self::try_begin_retraining`], also returning the registry
    /// generation the cycle started in.
    pub fn begin_retraining(&self, model_id: &str) -> Option<(ModelState, u64)> {
        let mut st = self.write();
        let generation = st.generation;
        let state = st.states.entry(model_id.to_string()).or_default();
        if *state == ModelState::Retraining {
            return None;
        }
        Some((std::mem::replace(state, ModelState::Retraining), generation))
    }

    /// Leave `Retraining` for `next`, unless a reset happened since the cycle
    /// began. Returns whether the state was written.
    pub fn finish_retraining(&self, model_id: &str, generation: u64, next: ModelState) -> bool {
        let mut st = self.write();
        if st.generation != generation {
            return false;
        }
        st.states.insert(model_id.to_string(), next);
        true
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Drop windows, performance, weights and states in one step.
    pub fn reset(&self) {
        let mut st = self.write();
        st.windows.clear();
        st.performance.clear();
        st.weights.clear();
        st.states.clear();
        st.generation = st.generation.wrapping_add(1);
    }

    pub fn is_empty(&self) -> bool {
        let st = self.read();
        st.windows.is_empty()
            && st.performance.is_empty()
            && st.weights.is_empty()
            && st.states.is_empty()
    }
}
