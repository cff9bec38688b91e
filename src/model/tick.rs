use serde::{Deserialize, Serialize};

/// One market observation as handed to the engine.
///
/// Every numeric field is optional: upstream feeds routinely drop volume or
/// timestamps, and the pipeline scores that as reduced completeness rather
/// than rejecting the observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub instrument: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
}

impl MarketData {
    pub fn new(instrument: impl Into<String>, price: f64, volume: f64, timestamp_ms: u64) -> Self {
        Self {
            instrument: instrument.into(),
            price: Some(price),
            volume: Some(volume),
            timestamp_ms: Some(timestamp_ms),
        }
    }

    /// Upper-cased, trimmed instrument symbol used for keys and model ids.
    pub fn instrument_key(&self) -> String {
        self.instrument.trim().to_ascii_uppercase()
    }

    /// Number of required fields (price, volume, timestamp) present.
    pub fn required_fields_present(&self) -> usize {
        let price = self.price.map(f64::is_finite).unwrap_or(false);
        let volume = self.volume.map(f64::is_finite).unwrap_or(false);
        [price, volume, self.timestamp_ms.is_some()]
            .iter()
            .filter(|present| **present)
            .count()
    }
}
