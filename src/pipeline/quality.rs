use crate::model::MarketData;

/// Number of fields counted by [`completeness`]: price, volume, timestamp.
pub const REQUIRED_FIELDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataQuality {
    pub freshness: f64,
    pub completeness: f64,
}

pub fn wall_clock_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Linear decay from 1 (age 0, or a timestamp ahead of `now_ms`) to 0 at
/// `max_age_ms`. A missing timestamp counts as fully stale.
pub fn freshness(observed_ms: Option<u64>, now_ms: u64, max_age_ms: u64) -> f64 {
    let Some(observed) = observed_ms else {
        return 0.0;
    };
    if max_age_ms == 0 {
        return if observed >= now_ms { 1.0 } else { 0.0 };
    }
    let age = now_ms.saturating_sub(observed) as f64;
    (1.0 - age / max_age_ms as f64).clamp(0.0, 1.0)
}

/// Share of price, volume and timestamp present. The instrument is an
/// identity key and does not count.
pub fn completeness(market: &MarketData) -> f64 {
    market.required_fields_present() as f64 / REQUIRED_FIELDS as f64
}

pub fn assess(market: &MarketData, now_ms: u64, max_age_ms: u64) -> DataQuality {
    DataQuality {
        freshness: freshness(market.timestamp_ms, now_ms, max_age_ms),
        completeness: completeness(market),
    }
}
