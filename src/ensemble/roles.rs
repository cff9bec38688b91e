use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Prior used for a model id whose role suffix is not recognised.
pub const UNKNOWN_ROLE_PRIOR: f64 = 0.10;

/// Structural position of a model inside the ensemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelRole {
    Lstm,
    Transformer,
    RandomForest,
    XgBoost,
}

impl ModelRole {
    pub const ALL: [ModelRole; 4] = [
        ModelRole::Lstm,
        ModelRole::Transformer,
        ModelRole::RandomForest,
        ModelRole::XgBoost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lstm => "LSTM",
            Self::Transformer => "TRANSFORMER",
            Self::RandomForest => "RANDOM_FOREST",
            Self::XgBoost => "XGBOOST",
        }
    }

    /// Historical reliability ranking: sequence > attention > forest > boosted trees.
    pub fn default_prior(self) -> f64 {
        match self {
            Self::Lstm => 0.35,
            Self::Transformer => 0.30,
            Self::RandomForest => 0.20,
            Self::XgBoost => 0.15,
        }
    }

    /// Instance id for this role on `instrument`, e.g. `ES_LSTM`.
    pub fn model_id(self, instrument: &str) -> String {
        format!("{}_{}", instrument.trim().to_ascii_uppercase(), self.as_str())
    }

    /// Recover the role from an instance id produced by [`ModelRole::model_id`].
    pub fn from_model_id(model_id: &str) -> Option<Self> {
        let upper = model_id.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|role| upper.ends_with(&format!("_{}", role.as_str())) || upper == role.as_str())
    }

    /// Instrument prefix of an instance id: `ES_RANDOM_FOREST` → `ES`.
    ///
    /// Ids without a known role suffix are split at their last underscore; an
    /// id with no underscore is its own group.
    pub fn instrument_of(model_id: &str) -> &str {
        let id = model_id.trim();
        for role in Self::ALL {
            let suffix = role.as_str();
            let Some(cut) = id.len().checked_sub(suffix.len() + 1) else {
                continue;
            };
            if cut > 0
                && id.is_char_boundary(cut)
                && id[cut..].starts_with('_')
                && id[cut + 1..].eq_ignore_ascii_case(suffix)
            {
                return &id[..cut];
            }
        }
        id.rsplit_once('_').map(|(prefix, _)| prefix).unwrap_or(id)
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "LSTM" => Ok(Self::Lstm),
            "TRANSFORMER" => Ok(Self::Transformer),
            "RANDOM_FOREST" | "RANDOMFOREST" | "RF" => Ok(Self::RandomForest),
            "XGBOOST" | "XGB" => Ok(Self::XgBoost),
            _ => bail!("unknown model role '{}'", s),
        }
    }
}

/// Static per-role priors, adjusted per call by reported confidence.
///
/// Kept apart from [`crate::registry::ModelWeightRegistry`]: these priors are
/// per structural role and never learn, the registry is per deployed model
/// instance and is driven by realized accuracy.
#[derive(Debug, Clone)]
pub struct RolePriors {
    priors: BTreeMap<ModelRole, f64>,
}

impl Default for RolePriors {
    fn default() -> Self {
        Self {
            priors: ModelRole::ALL
                .into_iter()
                .map(|role| (role, role.default_prior()))
                .collect(),
        }
    }
}

impl RolePriors {
    pub fn with_prior(mut self, role: ModelRole, prior: f64) -> Self {
        self.priors.insert(role, prior.max(0.0));
        self
    }

    pub fn prior_for(&self, model_id: &str) -> f64 {
        ModelRole::from_model_id(model_id)
            .and_then(|role| self.priors.get(&role).copied())
            .unwrap_or(UNKNOWN_ROLE_PRIOR)
    }

    /// Per-call weights: prior × confidence, renormalized to sum to 1.
    ///
    /// When every model reports zero confidence the plain priors are
    /// normalized instead, so the call still has a usable weighting.
    pub fn call_weights<'a, I>(&self, confidences: I) -> BTreeMap<String, f64>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let entries: Vec<(&str, f64, f64)> = confidences
            .into_iter()
            .map(|(id, conf)| {
                let conf = if conf.is_finite() { conf.clamp(0.0, 1.0) } else { 0.0 };
                (id, self.prior_for(id), conf)
            })
            .collect();

        let adjusted_total: f64 = entries.iter().map(|(_, p, c)| p * c).sum();
        if adjusted_total > f64::EPSILON {
            return entries
                .iter()
                .map(|(id, p, c)| (id.to_string(), p * c / adjusted_total))
                .collect();
        }

        let prior_total: f64 = entries.iter().map(|(_, p, _)| *p).sum();
        if prior_total > f64::EPSILON {
            return entries
                .iter()
                .map(|(id, p, _)| (id.to_string(), p / prior_total))
                .collect();
        }

        let n = entries.len().max(1) as f64;
        entries
            .iter()
            .map(|(id, _, _)| (id.to_string(), 1.0 / n))
            .collect()
    }
}
