use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::model::Prediction;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub prediction: Arc<Prediction>,
    pub timestamp_ms: u64,
    /// Set once a realized outcome has been scored against this entry.
    pub resolved: bool,
}

/// Bounded per-instrument timeline of produced predictions, oldest first.
#[derive(Debug)]
pub struct PredictionHistory {
    capacity: usize,
    by_instrument: HashMap<String, VecDeque<HistoryEntry>>,
}

impl Default for PredictionHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl PredictionHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            by_instrument: HashMap::new(),
        }
    }

    pub fn push(&mut self, prediction: Arc<Prediction>) {
        let key = prediction.instrument.trim().to_ascii_uppercase();
        let timestamp_ms = prediction.timestamp_ms;
        let timeline = self.by_instrument.entry(key).or_default();
        timeline.push_back(HistoryEntry {
            prediction,
            timestamp_ms,
            resolved: false,
        });
        while timeline.len() > self.capacity {
            let _ = timeline.pop_front();
        }
    }

    pub fn entries(&self, instrument: &str) -> Vec<HistoryEntry> {
        let key = instrument.trim().to_ascii_uppercase();
        self.by_instrument
            .get(&key)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, instrument: &str) -> usize {
        let key = instrument.trim().to_ascii_uppercase();
        self.by_instrument.get(&key).map(VecDeque::len).unwrap_or(0)
    }

    /// Most recent prediction made at or before `timestamp_ms`.
    pub fn latest_at_or_before(
        &self,
        instrument: &str,
        timestamp_ms: u64,
    ) -> Option<Arc<Prediction>> {
        let key = instrument.trim().to_ascii_uppercase();
        self.by_instrument
            .get(&key)?
            .iter()
            .rev()
            .find(|e| e.timestamp_ms <= timestamp_ms)
            .map(|e| e.prediction.clone())
    }

    /// Claim the most recent prediction made at or before `timestamp_ms` for
    /// scoring. Returns `None` when there is none or it was already claimed;
    /// older entries are never claimed in its place.
    pub fn claim_unresolved(
        &mut self,
        instrument: &str,
        timestamp_ms: u64,
    ) -> Option<Arc<Prediction>> {
        let key = instrument.trim().to_ascii_uppercase();
        let entry = self
            .by_instrument
            .get_mut(&key)?
            .iter_mut()
            .rev()
            .find(|e| e.timestamp_ms <= timestamp_ms)?;
        if entry.resolved {
            return None;
        }
        entry.resolved = true;
        Some(entry.prediction.clone())
    }
}
