use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::model::{MarketData, Prediction};

#[derive(Debug, Clone)]
struct CachedEntry {
    prediction: Arc<Prediction>,
    stored_at: Instant,
}

type Slot = Arc<OnceCell<CachedEntry>>;

/// Cache key: instrument, observation time and the raw price/volume inputs.
pub fn cache_key(market: &MarketData) -> String {
    fn field<T: ToString>(v: Option<T>) -> String {
        v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
    }
    format!(
        "{}::{}::{}::{}",
        market.instrument_key(),
        field(market.timestamp_ms),
        field(market.price.map(f64::to_bits)),
        field(market.volume.map(f64::to_bits)),
    )
}

/// TTL cache of combined predictions that collapses concurrent misses.
///
/// Each key owns a [`OnceCell`]; the first caller runs the computation and
/// later callers for the same key wait on that cell instead of computing
/// again. A failed computation leaves the cell empty, so nothing is cached
/// and the next caller retries. Entries past their TTL are treated as absent.
#[derive(Debug)]
pub struct PredictionCache {
    ttl: Duration,
    max_entries: usize,
    slots: Mutex<HashMap<String, Slot>>,
}

impl PredictionCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the live entry for `key`, or run `compute` (at most once
    /// concurrently per key) and cache its result.
    pub async fn get_or_try_compute<F, Fut, E>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<Arc<Prediction>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Prediction>, E>>,
    {
        let slot = self.slot_for(key);
        let result = slot
            .get_or_try_init(|| async move {
                compute().await.map(|prediction| CachedEntry {
                    prediction,
                    stored_at: Instant::now(),
                })
            })
            .await;
        match result {
            Ok(entry) => Ok(entry.prediction.clone()),
            Err(e) => {
                self.discard_failed(key, &slot);
                Err(e)
            }
        }
    }

    /// Live cached prediction for `key`, without computing anything.
    pub fn get(&self, key: &str) -> Option<Arc<Prediction>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = slots.get(key)?.get()?;
        if entry.stored_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.prediction.clone())
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn slot_for(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if let Some(slot) = slots.get(key) {
            let expired = slot
                .get()
                .map(|entry| now.duration_since(entry.stored_at) >= self.ttl)
                .unwrap_or(false);
            if !expired {
                return slot.clone();
            }
        }
        self.evict(&mut slots, now);
        let slot: Slot = Arc::new(OnceCell::new());
        slots.insert(key.to_string(), slot.clone());
        slot
    }

    /// Drop expired entries, then the oldest settled ones while over capacity.
    /// In-flight slots are never evicted.
    fn evict(&self, slots: &mut HashMap<String, Slot>, now: Instant) {
        slots.retain(|_, slot| match slot.get() {
            Some(entry) => now.duration_since(entry.stored_at) < self.ttl,
            None => true,
        });
        if slots.len() < self.max_entries {
            return;
        }
        let mut settled: Vec<(String, Instant)> = slots
            .iter()
            .filter_map(|(k, slot)| slot.get().map(|e| (k.clone(), e.stored_at)))
            .collect();
        settled.sort_by_key(|(_, at)| *at);
        let excess = slots.len() + 1 - self.max_entries;
        for (key, _) in settled.into_iter().take(excess) {
            slots.remove(&key);
        }
    }

    fn discard_failed(&self, key: &str, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(current) = slots.get(key) else {
            return;
        };
        // Map + this caller hold the only references: nobody is waiting.
        if Arc::ptr_eq(current, slot) && !slot.initialized() && Arc::strong_count(slot) <= 2 {
            slots.remove(key);
        }
    }
}
