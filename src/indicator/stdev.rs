use std::collections::VecDeque;

/// Population standard deviation over the last `period` values.
#[derive(Debug, Clone)]
pub struct RollingStd {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
}

impl RollingStd {
    pub fn new(period: usize) -> Self {
        let period = period.max(2);
        Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.values.len() == self.period {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
                self.sum_sq -= old * old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        if !self.is_ready() {
            return None;
        }
        let n = self.values.len() as f64;
        let mean = self.sum / n;
        // Running sums can drift slightly negative.
        Some((self.sum_sq / n - mean * mean).max(0.0).sqrt())
    }

    pub fn is_ready(&self) -> bool {
        self.values.len() >= self.period
    }

    pub fn period(&self) -> usize {
        self.period
    }
}
