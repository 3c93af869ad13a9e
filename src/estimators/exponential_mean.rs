/// Exponentially weighted moving average
///
/// `e = alpha * value + (1 - alpha) * e`, seeded with the first value.
/// Alpha is fixed for the lifetime of an instance: a new alpha means a new
/// instance, past weighting is never recomputed.
#[derive(Debug, Clone)]
pub struct ExponentialMean {
    alpha: f64,
    estimate: Option<f64>,
}

impl ExponentialMean {
    /// # Arguments
    /// * `alpha` - Smoothing factor in (0, 1]; 1 follows the input exactly
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            estimate: None,
        }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        let next = match self.estimate {
            None => value,
            Some(e) => self.alpha * value + (1.0 - self.alpha) * e,
        };
        self.estimate = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.estimate
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.estimate = None;
    }
}
