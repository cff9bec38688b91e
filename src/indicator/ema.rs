use super::sma::Sma;

/// Exponential moving average seeded with the SMA of its first `period` values.
#[derive(Debug, Clone)]
pub struct Ema {
    multiplier: f64,
    value: Option<f64>,
    seed: Sma,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            multiplier: 2.0 / (period as f64 + 1.0),
            value: None,
            seed: Sma::new(period),
        }
    }

    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.value = match self.value {
            Some(prev) => Some(prev + (value - prev) * self.multiplier),
            None => self.seed.push(value),
        };
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    pub fn period(&self) -> usize {
        self.seed.period()
    }
}
