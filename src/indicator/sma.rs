/// Simple moving average over a fixed ring buffer, O(1) per push.
#[derive(Debug, Clone)]
pub struct Sma {
    buffer: Vec<f64>,
    head: usize,
    count: usize,
    sum: f64,
}

impl Sma {
    /// A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        Self {
            buffer: vec![0.0; period.max(1)],
            head: 0,
            count: 0,
            sum: 0.0,
        }
    }

    /// Push a value and return the average once the window is full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let period = self.buffer.len();
        if self.count >= period {
            self.sum -= self.buffer[self.head];
        }
        self.buffer[self.head] = value;
        self.sum += value;
        self.head = (self.head + 1) % period;
        self.count = (self.count + 1).min(period);
        self.value()
    }

    pub fn value(&self) -> Option<f64> {
        self.is_ready().then(|| self.sum / self.buffer.len() as f64)
    }

    pub fn is_ready(&self) -> bool {
        self.count >= self.buffer.len()
    }

    pub fn period(&self) -> usize {
        self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
