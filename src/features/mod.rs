use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::collaborators::FeaturePipeline;
use crate::indicator::{Ema, RollingStd, Sma};
use crate::model::{FeatureVector, MarketData};

pub const RET_1: &str = "ret_1";
pub const RET_5: &str = "ret_5";
pub const SMA_RATIO: &str = "sma_ratio";
pub const EMA_GAP: &str = "ema_gap";
pub const VOLATILITY: &str = "volatility";
pub const VOLUME_RATIO: &str = "volume_ratio";

const LONG_RETURN_LAG: usize = 5;

#[derive(Debug, Clone)]
pub struct FeatureSettings {
    pub fast_period: usize,
    pub slow_period: usize,
    pub ema_period: usize,
    pub volatility_period: usize,
    pub volume_period: usize,
    /// Keep only these features when set.
    pub selected: Option<Vec<String>>,
    /// Clip every feature into `[-clip, clip]` when set.
    pub clip: Option<f64>,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            fast_period: 5,
            slow_period: 20,
            ema_period: 10,
            volatility_period: 20,
            volume_period: 20,
            selected: None,
            clip: Some(5.0),
        }
    }
}

impl FeatureSettings {
    /// Observations needed before the first vector is produced.
    pub fn warm_up(&self) -> usize {
        [
            self.slow_period,
            self.fast_period,
            self.ema_period,
            self.volatility_period + 1,
            LONG_RETURN_LAG + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }
}

#[derive(Debug)]
struct InstrumentState {
    prices: VecDeque<f64>,
    observed: usize,
    fast: Sma,
    slow: Sma,
    ema: Ema,
    volatility: RollingStd,
    volume: Sma,
}

impl InstrumentState {
    fn new(settings: &FeatureSettings) -> Self {
        Self {
            prices: VecDeque::with_capacity(LONG_RETURN_LAG + 1),
            observed: 0,
            fast: Sma::new(settings.fast_period),
            slow: Sma::new(settings.slow_period),
            ema: Ema::new(settings.ema_period),
            volatility: RollingStd::new(settings.volatility_period),
            volume: Sma::new(settings.volume_period),
        }
    }

    fn observe(&mut self, price: f64, volume: Option<f64>) {
        if let Some(prev) = self.prices.back().copied() {
            self.volatility.push(price / prev - 1.0);
        }
        self.prices.push_back(price);
        while self.prices.len() > LONG_RETURN_LAG + 1 {
            let _ = self.prices.pop_front();
        }
        self.fast.push(price);
        self.slow.push(price);
        self.ema.push(price);
        if let Some(v) = volume.filter(|v| v.is_finite() && *v >= 0.0) {
            self.volume.push(v);
        }
        self.observed += 1;
    }

    fn features(&self, price: f64, volume: Option<f64>) -> Option<FeatureVector> {
        let n = self.prices.len();
        let prev = *self.prices.get(n.checked_sub(2)?)?;
        let lagged = *self.prices.get(n.checked_sub(LONG_RETURN_LAG + 1)?)?;
        let mut out = FeatureVector::new()
            .with(RET_1, price / prev - 1.0)
            .with(RET_5, price / lagged - 1.0)
            .with(SMA_RATIO, self.fast.value()? / self.slow.value()? - 1.0)
            .with(EMA_GAP, price / self.ema.value()? - 1.0)
            .with(VOLATILITY, self.volatility.value()?);
        let avg_volume = self.volume.value().filter(|v| *v > f64::EPSILON);
        if let (Some(v), Some(avg)) = (volume.filter(|v| v.is_finite()), avg_volume) {
            out.insert(VOLUME_RATIO, v / avg);
        }
        Some(out)
    }
}

/// Rolling technical features per instrument.
///
/// Each call with a price advances that instrument's state. Until the warm-up
/// length is reached, or when the observation carries no usable price, the
/// pipeline answers `Ok(None)`.
#[derive(Debug, Default)]
pub struct RollingFeaturePipeline {
    settings: FeatureSettings,
    states: Mutex<HashMap<String, InstrumentState>>,
}

impl RollingFeaturePipeline {
    pub fn new(settings: FeatureSettings) -> Self {
        Self {
            settings,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &FeatureSettings {
        &self.settings
    }

    /// Observations seen so far for `instrument`.
    pub fn observed(&self, instrument: &str) -> usize {
        let key = instrument.trim().to_ascii_uppercase();
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .map(|s| s.observed)
            .unwrap_or(0)
    }

    /// Apply subset selection and clipping.
    pub fn normalize(&self, features: FeatureVector) -> FeatureVector {
        let selected = match &self.settings.selected {
            Some(names) => features.select(names),
            None => features,
        };
        match self.settings.clip {
            Some(limit) if limit > 0.0 => selected
                .iter()
                .map(|(name, v)| (name.to_string(), v.clamp(-limit, limit)))
                .collect(),
            _ => selected,
        }
    }

    fn step(&self, market: &MarketData) -> Result<Option<FeatureVector>> {
        let Some(price) = market.price.filter(|p| p.is_finite()) else {
            return Ok(None);
        };
        if price <= 0.0 {
            bail!("non-positive price {} for {}", price, market.instrument);
        }
        let key = market.instrument_key();
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(key)
            .or_insert_with(|| InstrumentState::new(&self.settings));
        state.observe(price, market.volume);
        if state.observed < self.settings.warm_up() {
            return Ok(None);
        }
        Ok(state
            .features(price, market.volume)
            .map(|f| self.normalize(f))
            .filter(|f| !f.is_empty()))
    }
}

#[async_trait]
impl FeaturePipeline for RollingFeaturePipeline {
    async fn extract_features(&self, market: &MarketData) -> Result<Option<FeatureVector>> {
        self.step(market)
    }
}
