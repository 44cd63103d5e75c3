use std::collections::VecDeque;

/// Bounded, append-only rolling buffer of close/low/high samples
///
/// Owned exclusively by one instrument trader. The oldest sample is evicted
/// once the configured capacity is reached, so the length never exceeds it.
#[derive(Debug)]
pub struct PriceWindow {
    closes: VecDeque<f64>,
    lows: VecDeque<f64>,
    highs: VecDeque<f64>,
    max_len: usize,
}

/// Contiguous copy of the window taken once per tick for strategy evaluation
#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub closes: Vec<f64>,
    pub lows: Vec<f64>,
    pub highs: Vec<f64>,
}

impl WindowSnapshot {
    pub fn new(closes: Vec<f64>, lows: Vec<f64>, highs: Vec<f64>) -> Self {
        Self {
            closes,
            lows,
            highs,
        }
    }

    /// Snapshot where every candle collapses to its close (close-only
    /// strategies and tests)
    pub fn from_closes(closes: &[f64]) -> Self {
        Self {
            closes: closes.to_vec(),
            lows: closes.to_vec(),
            highs: closes.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.last().copied()
    }
}

impl PriceWindow {
    pub fn new(max_len: usize) -> Self {
        Self {
            closes: VecDeque::with_capacity(max_len),
            lows: VecDeque::with_capacity(max_len),
            highs: VecDeque::with_capacity(max_len),
            max_len,
        }
    }

    pub fn push(&mut self, close: f64, low: f64, high: f64) {
        self.closes.push_back(close);
        self.lows.push_back(low);
        self.highs.push_back(high);

        while self.closes.len() > self.max_len {
            self.closes.pop_front();
            self.lows.pop_front();
            self.highs.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.back().copied()
    }

    /// Close of the sample before the most recent one (cool-down release)
    pub fn previous_close(&self) -> Option<f64> {
        if self.closes.len() < 2 {
            return None;
        }
        self.closes.get(self.closes.len() - 2).copied()
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            closes: self.closes.iter().copied().collect(),
            lows: self.lows.iter().copied().collect(),
            highs: self.highs.iter().copied().collect(),
        }
    }
}
