use std::collections::VecDeque;

pub const DEFAULT_PERFORMANCE_WINDOW: usize = 50;
/// Performance reported before any outcome is known.
pub const NO_INFORMATION_PERFORMANCE: f64 = 0.5;

/// Bounded FIFO of correct/incorrect flags; the newest evicts the oldest.
#[derive(Debug, Clone)]
pub struct PerformanceWindow {
    capacity: usize,
    results: VecDeque<bool>,
}

impl Default for PerformanceWindow {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_PERFORMANCE_WINDOW)
    }
}

impl PerformanceWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            results: VecDeque::with_capacity(capacity),
        }
    }

    pub fn from_results(capacity: usize, results: impl IntoIterator<Item = bool>) -> Self {
        let mut window = Self::with_capacity(capacity);
        for r in results {
            window.push(r);
        }
        window
    }

    pub fn push(&mut self, correct: bool) {
        self.results.push_back(correct);
        while self.results.len() > self.capacity {
            let _ = self.results.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn results(&self) -> impl Iterator<Item = bool> + '_ {
        self.results.iter().copied()
    }

    pub fn current_performance(&self) -> f64 {
        calculate_current_performance(self.results.iter().copied())
    }
}

/// Share of `true` in `results`, or 0.5 when there are none.
pub fn calculate_current_performance(results: impl IntoIterator<Item = bool>) -> f64 {
    let (hits, n) = results
        .into_iter()
        .fold((0usize, 0usize), |(h, n), r| (h + usize::from(r), n + 1));
    if n == 0 {
        return NO_INFORMATION_PERFORMANCE;
    }
    hits as f64 / n as f64
}
