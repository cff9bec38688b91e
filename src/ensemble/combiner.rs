use std::collections::BTreeMap;

use crate::model::prediction::clip_unit;
use crate::model::{Direction, Prediction, Recommendation};

/// Midpoint reported when there is nothing to combine.
pub const NEUTRAL_MIDPOINT: f64 = 0.5;

const DIRECTION_EPS: f64 = 1e-12;

/// Result of blending per-model predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedSignal {
    pub direction: Direction,
    pub strength: f64,
    pub confidence: f64,
    pub recommendation: Recommendation,
    /// Normalized weights actually applied, keyed by model id.
    pub weights: BTreeMap<String, f64>,
}

impl CombinedSignal {
    pub fn neutral() -> Self {
        Self {
            direction: Direction::Neutral,
            strength: NEUTRAL_MIDPOINT,
            confidence: NEUTRAL_MIDPOINT,
            recommendation: Recommendation::Hold,
            weights: BTreeMap::new(),
        }
    }
}

/// Blend `predictions` (keyed by model id) using `weights`.
///
/// Models absent from `weights`, or carrying a non-finite or negative weight,
/// contribute nothing. If no model ends up with positive weight every model
/// is weighted equally.
pub fn combine(
    predictions: &BTreeMap<String, Prediction>,
    weights: &BTreeMap<String, f64>,
) -> CombinedSignal {
    if predictions.is_empty() {
        return CombinedSignal::neutral();
    }

    let mut applied: BTreeMap<String, f64> = predictions
        .keys()
        .map(|id| {
            let w = weights.get(id).copied().unwrap_or(0.0);
            let w = if w.is_finite() && w > 0.0 { w } else { 0.0 };
            (id.clone(), w)
        })
        .collect();
    let mut total: f64 = applied.values().sum();
    if total <= f64::EPSILON {
        let equal = 1.0 / applied.len() as f64;
        for w in applied.values_mut() {
            *w = equal;
        }
        total = 1.0;
    }
    for w in applied.values_mut() {
        *w /= total;
    }

    let mut score = 0.0;
    let mut strength = 0.0;
    let mut confidence = 0.0;
    for (id, p) in predictions {
        let w = applied.get(id).copied().unwrap_or(0.0);
        let conf = clip_unit(p.confidence);
        score += w * conf * p.direction.as_f64() * p.strength.abs();
        strength += w * p.strength.abs();
        confidence += w * conf;
    }

    let direction = if score.abs() <= DIRECTION_EPS {
        Direction::Neutral
    } else {
        Direction::from_sign(score)
    };
    let strength = clip_unit(strength);
    let confidence = clip_unit(confidence);

    CombinedSignal {
        direction,
        strength,
        confidence,
        recommendation: Recommendation::from_parts(direction, strength, confidence),
        weights: applied,
    }
}
