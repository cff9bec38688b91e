use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::collaborators::ModelRuntime;
use crate::ensemble::ModelRole;
use crate::features::RET_1;
use crate::model::{Direction, FeatureVector, ModelOutput, TrainingBatch};

/// Gaussian forecast of the next one-step return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnForecast {
    pub mu: f64,
    pub sigma: f64,
}

/// Online estimator behind each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaselineKind {
    Ewma,
    Ar1,
    Holt,
    Kalman,
}

impl BaselineKind {
    pub fn for_role(role: ModelRole) -> Self {
        match role {
            ModelRole::Lstm => Self::Holt,
            ModelRole::Transformer => Self::Kalman,
            ModelRole::RandomForest => Self::Ar1,
            ModelRole::XgBoost => Self::Ewma,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BaselineConfig {
    pub alpha_mean: f64,
    pub alpha_var: f64,
    pub beta_trend: f64,
    pub phi_clip: f64,
    pub process_var: f64,
    pub measure_var: f64,
    pub min_sigma: f64,
    /// |mu / sigma| below this is called neutral.
    pub neutral_z: f64,
    /// Confidence is `n / (n + shrink)` after `n` observed returns.
    pub shrink: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            alpha_mean: 0.08,
            alpha_var: 0.08,
            beta_trend: 0.08,
            phi_clip: 0.98,
            process_var: 1e-6,
            measure_var: 1e-4,
            min_sigma: 1e-4,
            neutral_z: 0.05,
            shrink: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EwmaState {
    mu: f64,
    var: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Ar1State {
    last_return: Option<f64>,
    mu: f64,
    var: f64,
    cov1: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct HoltState {
    level: f64,
    trend: f64,
    var: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct KalmanState {
    x: f64,
    p: f64,
}

#[derive(Debug, Clone, Copy)]
enum Estimator {
    Ewma(EwmaState),
    Ar1(Ar1State),
    Holt(HoltState),
    Kalman(KalmanState),
}

/// One model instance: its estimator plus the number of returns it has seen.
#[derive(Debug, Clone, Copy)]
struct BaselineModel {
    estimator: Estimator,
    samples: u64,
}

impl BaselineModel {
    fn new(kind: BaselineKind) -> Self {
        let estimator = match kind {
            BaselineKind::Ewma => Estimator::Ewma(EwmaState::default()),
            BaselineKind::Ar1 => Estimator::Ar1(Ar1State::default()),
            BaselineKind::Holt => Estimator::Holt(HoltState::default()),
            BaselineKind::Kalman => Estimator::Kalman(KalmanState::default()),
        };
        Self {
            estimator,
            samples: 0,
        }
    }

    fn observe(&mut self, r: f64, cfg: &BaselineConfig) {
        if !r.is_finite() {
            return;
        }
        let first = self.samples == 0;
        let a_mu = cfg.alpha_mean.clamp(0.0, 1.0);
        let a_var = cfg.alpha_var.clamp(0.0, 1.0);
        match &mut self.estimator {
            Estimator::Ewma(st) => {
                st.mu = if first { r } else { (1.0 - a_mu) * st.mu + a_mu * r };
                let centered = r - st.mu;
                st.var = if first {
                    centered * centered
                } else {
                    (1.0 - a_var) * st.var + a_var * centered * centered
                };
            }
            Estimator::Ar1(st) => {
                let prev_mu = st.mu;
                st.mu = if first { r } else { (1.0 - a_mu) * st.mu + a_mu * r };
                let centered = r - prev_mu;
                st.var = if first {
                    centered * centered
                } else {
                    (1.0 - a_var) * st.var + a_var * centered * centered
                };
                if let Some(prev_r) = st.last_return {
                    let cov = (prev_r - prev_mu) * (r - prev_mu);
                    st.cov1 = if self.samples <= 1 {
                        cov
                    } else {
                        (1.0 - a_var) * st.cov1 + a_var * cov
                    };
                }
                st.last_return = Some(r);
            }
            Estimator::Holt(st) => {
                if first {
                    *st = HoltState {
                        level: r,
                        trend: 0.0,
                        var: 0.0,
                    };
                } else {
                    let b = cfg.beta_trend.clamp(0.0, 1.0);
                    let pred = st.level + st.trend;
                    let level = a_mu * r + (1.0 - a_mu) * pred;
                    let err = r - pred;
                    st.trend = b * (level - st.level) + (1.0 - b) * st.trend;
                    st.level = level;
                    st.var = (1.0 - a_var) * st.var + a_var * err * err;
                }
            }
            Estimator::Kalman(st) => {
                let r_var = cfg.measure_var.max(1e-12);
                if first {
                    *st = KalmanState { x: r, p: r_var };
                } else {
                    let p_pred = st.p + cfg.process_var.max(1e-12);
                    let k = p_pred / (p_pred + r_var);
                    st.x += k * (r - st.x);
                    st.p = (1.0 - k) * p_pred;
                }
            }
        }
        self.samples = self.samples.saturating_add(1);
    }

    fn forecast(&self, cfg: &BaselineConfig) -> Option<ReturnForecast> {
        if self.samples == 0 {
            return None;
        }
        let (mu, sigma) = match self.estimator {
            Estimator::Ewma(st) => (st.mu, st.var.max(0.0).sqrt()),
            Estimator::Ar1(st) => {
                let var = st.var.max(0.0);
                let phi = if var > 1e-12 { st.cov1 / var } else { 0.0 };
                let phi = phi.clamp(-cfg.phi_clip, cfg.phi_clip);
                let mu = match st.last_return {
                    Some(last) => st.mu + phi * (last - st.mu),
                    None => st.mu,
                };
                (mu, ((1.0 - phi * phi).max(0.05) * var).sqrt())
            }
            Estimator::Holt(st) => (st.level + st.trend, st.var.max(0.0).sqrt()),
            Estimator::Kalman(st) => (st.x, (st.p + cfg.measure_var.max(1e-12)).sqrt()),
        };
        Some(ReturnForecast {
            mu,
            sigma: sigma.max(cfg.min_sigma),
        })
    }

    fn output(&self, cfg: &BaselineConfig) -> ModelOutput {
        let Some(f) = self.forecast(cfg) else {
            return ModelOutput::new(Direction::Neutral, 0.0, 0.0);
        };
        let z = f.mu / f.sigma;
        let direction = if z.abs() < cfg.neutral_z {
            Direction::Neutral
        } else {
            Direction::from_sign(z)
        };
        let n = self.samples as f64;
        ModelOutput::new(direction, z.abs().tanh(), n / (n + cfg.shrink.max(0.0)))
    }
}

/// In-process statistical stand-ins for the deployed models.
///
/// Every model id resolves to a role by its suffix and gets its own estimator.
/// `predict` feeds the vector's `ret_1` into that estimator and forecasts the
/// next return; `update_model` refits from scratch by replaying a batch.
#[derive(Debug, Default)]
pub struct BaselineModelRuntime {
    config: BaselineConfig,
    models: Mutex<HashMap<String, BaselineModel>>,
    offline: Mutex<HashSet<String>>,
}

impl BaselineModelRuntime {
    pub fn new(config: BaselineConfig) -> Self {
        Self {
            config,
            models: Mutex::new(HashMap::new()),
            offline: Mutex::new(HashSet::new()),
        }
    }

    /// Make `model_id` fail every request until brought back online.
    pub fn set_offline(&self, model_id: &str, offline: bool) {
        let mut set = self.offline.lock().unwrap_or_else(PoisonError::into_inner);
        if offline {
            set.insert(model_id.to_string());
        } else {
            set.remove(model_id);
        }
    }

    pub fn samples(&self, model_id: &str) -> u64 {
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_id)
            .map(|m| m.samples)
            .unwrap_or(0)
    }

    pub fn forecast(&self, model_id: &str) -> Option<ReturnForecast> {
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model_id)?
            .forecast(&self.config)
    }

    fn kind_for(&self, model_id: &str) -> Result<BaselineKind> {
        if self
            .offline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(model_id)
        {
            return Err(anyhow!("model {} is offline", model_id));
        }
        ModelRole::from_model_id(model_id)
            .map(BaselineKind::for_role)
            .ok_or_else(|| anyhow!("no model deployed under id {}", model_id))
    }

    fn observe_and_predict(&self, model_id: &str, features: &FeatureVector) -> Result<ModelOutput> {
        let kind = self.kind_for(model_id)?;
        let r = features
            .get(RET_1)
            .ok_or_else(|| anyhow!("feature {} missing for {}", RET_1, model_id))?;
        let mut models = self.models.lock().unwrap_or_else(PoisonError::into_inner);
        let model = models
            .entry(model_id.to_string())
            .or_insert_with(|| BaselineModel::new(kind));
        model.observe(r, &self.config);
        Ok(model.output(&self.config))
    }

    fn refit(&self, model_id: &str, batch: &TrainingBatch) -> Result<bool> {
        let kind = self.kind_for(model_id)?;
        let returns: Vec<f64> = batch
            .features
            .iter()
            .filter_map(|f| f.get(RET_1))
            .filter(|r| r.is_finite())
            .collect();
        if returns.is_empty() {
            tracing::debug!(model_id = %model_id, rows = batch.len(), "Batch has no usable returns");
            return Ok(false);
        }
        let mut fresh = BaselineModel::new(kind);
        for r in &returns {
            fresh.observe(*r, &self.config);
        }
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model_id.to_string(), fresh);
        tracing::info!(model_id = %model_id, samples = returns.len(), "Baseline model refitted");
        Ok(true)
    }
}

#[async_trait]
impl ModelRuntime for BaselineModelRuntime {
    async fn predict(&self, model_id: &str, features: &FeatureVector) -> Result<ModelOutput> {
        self.observe_and_predict(model_id, features)
    }

    async fn update_model(&self, model_id: &str, batch: &TrainingBatch) -> Result<bool> {
        self.refit(model_id, batch)
    }
}
