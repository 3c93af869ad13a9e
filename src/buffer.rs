use std::collections::VecDeque;

use crate::sample::Sample;

/// Bounded FIFO of the most recent samples of one source
///
/// Holds at most `capacity` samples, oldest first. Appending to a full
/// buffer drops the oldest sample; shrinking the capacity drops from the
/// front. Capacity is validated by the caller and is at least 1.
#[derive(Debug, Clone)]
pub struct RetentionBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl RetentionBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one if the buffer is full
    ///
    /// Returns the evicted sample, if any.
    pub fn append(&mut self, sample: Sample) -> Option<Sample> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    /// Change the capacity, truncating from the front if needed
    ///
    /// Returns the number of evicted samples.
    pub fn resize(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);
        let excess = self.samples.len().saturating_sub(self.capacity);
        self.samples.drain(..excess);
        excess
    }

    /// Owned copy of the contents in chronological order (oldest to newest)
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    /// Get latest N samples in chronological order (oldest to newest)
    pub fn latest(&self, count: usize) -> Vec<Sample> {
        let start = self.samples.len().saturating_sub(count);
        self.samples.range(start..).copied().collect()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
