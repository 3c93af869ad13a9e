use serde::Serialize;

/// A single timestamped reading of a process variable
///
/// `timestamp` is in seconds since the session epoch. Samples are plain
/// values: once built they are copied, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Build a sample from a possibly missing reading
    ///
    /// Returns `None` for a missing or non-finite value, which the pipeline
    /// treats as a gap.
    pub fn from_reading(timestamp: f64, value: Option<f64>) -> Option<Self> {
        value
            .filter(|v| v.is_finite())
            .map(|v| Self::new(timestamp, v))
    }

    /// Same timestamp, different value
    pub fn with_value(&self, value: f64) -> Self {
        Self {
            timestamp: self.timestamp,
            value,
        }
    }
}
