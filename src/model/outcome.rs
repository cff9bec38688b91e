use serde::{Deserialize, Serialize};

use crate::model::feature::FeatureVector;
use crate::model::signal::Direction;

/// Realized result of a trade, produced when the position resolves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub direction: Direction,
    pub pnl: f64,
    pub timestamp_ms: u64,
}

impl Outcome {
    pub fn new(direction: Direction, pnl: f64, timestamp_ms: u64) -> Self {
        Self {
            direction,
            pnl,
            timestamp_ms,
        }
    }
}

/// Column-oriented training batch assembled by an outcome store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingBatch {
    pub features: Vec<FeatureVector>,
    pub labels: Vec<f64>,
    pub timestamps: Vec<u64>,
}

impl TrainingBatch {
    /// True only when all three columns are empty.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty() && self.labels.is_empty() && self.timestamps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn push(&mut self, features: FeatureVector, label: f64, timestamp_ms: u64) {
        self.features.push(features);
        self.labels.push(label);
        self.timestamps.push(timestamp_ms);
    }
}
