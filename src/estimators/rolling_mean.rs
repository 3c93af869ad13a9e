use std::collections::VecDeque;

/// Moving average over the last W samples
///
/// Computes the arithmetic mean of a sliding window. The window never
/// exceeds the retention capacity of its source, so the effective size is
/// `min(W, capacity)`.
///
/// The sum is updated incrementally, making each update O(1). It is rebuilt
/// from the window contents once per full turnover so rounding error cannot
/// accumulate over long runs.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: VecDeque<f64>,
    window_size: usize,
    effective_size: usize,
    sum: f64,
    evictions: usize,
}

impl RollingMean {
    /// Create a new rolling mean
    ///
    /// # Arguments
    /// * `window_size` - Number of samples to average (larger = smoother but slower response)
    /// * `capacity` - Retention capacity of the owning source
    pub fn new(window_size: usize, capacity: usize) -> Self {
        let window_size = window_size.max(1);
        let effective_size = window_size.min(capacity.max(1));
        Self {
            window: VecDeque::with_capacity(effective_size + 1),
            window_size,
            effective_size,
            sum: 0.0,
            evictions: 0,
        }
    }

    /// Add a new value and return the updated mean
    ///
    /// During warm-up the mean covers the values seen so far.
    pub fn update(&mut self, value: f64) -> f64 {
        self.window.push_back(value);
        self.sum += value;

        while self.window.len() > self.effective_size {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
                self.evictions += 1;
            }
        }

        if self.evictions >= self.effective_size {
            self.resum();
        }

        self.sum / self.window.len() as f64
    }

    /// Current mean without adding a value
    pub fn average(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.sum / self.window.len() as f64)
        }
    }

    /// Re-cap the window after the source's retention capacity changed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.effective_size = self.window_size.min(capacity.max(1));
        let excess = self.window.len().saturating_sub(self.effective_size);
        if excess > 0 {
            self.window.drain(..excess);
            self.resum();
        }
    }

    /// Number of samples the mean covers once warmed up
    pub fn effective_size(&self) -> usize {
        self.effective_size
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.evictions = 0;
    }

    fn resum(&mut self) {
        self.sum = self.window.iter().sum();
        self.evictions = 0;
    }
}
