use std::collections::VecDeque;

/// Jump-adaptive average
///
/// Averages the samples of the current *phase*. A phase ends when two
/// consecutive values differ by strictly more than the phase threshold; the
/// next phase starts with the value that broke it. Within a phase only the
/// last `points_per_phase` values are averaged, which bounds memory and
/// lets the mean follow slow drift.
///
/// Compared to a rolling window this recovers immediately after a step,
/// and unlike an exponential mean it fully forgets the pre-step level.
#[derive(Debug, Clone)]
pub struct AdaptiveMean {
    phase_threshold: f64,
    points_per_phase: usize,
    phase: VecDeque<f64>,
    last_value: Option<f64>,
    phase_count: u64,
}

impl AdaptiveMean {
    /// # Arguments
    /// * `phase_threshold` - Value delta above which a new phase starts
    /// * `points_per_phase` - Maximum number of values averaged per phase
    pub fn new(phase_threshold: f64, points_per_phase: usize) -> Self {
        let points_per_phase = points_per_phase.max(1);
        Self {
            phase_threshold,
            points_per_phase,
            phase: VecDeque::with_capacity(points_per_phase + 1),
            last_value: None,
            phase_count: 0,
        }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        match self.last_value {
            Some(last) if (value - last).abs() > self.phase_threshold => {
                self.phase.clear();
                self.phase_count += 1;
            }
            None => self.phase_count += 1,
            Some(_) => {}
        }

        self.phase.push_back(value);
        if self.phase.len() > self.points_per_phase {
            self.phase.pop_front();
        }

        self.last_value = Some(value);

        self.phase.iter().sum::<f64>() / self.phase.len() as f64
    }

    /// Number of phases seen so far, including the current one
    pub fn phase_count(&self) -> u64 {
        self.phase_count
    }

    /// Number of values in the current phase window
    pub fn phase_len(&self) -> usize {
        self.phase.len()
    }

    pub fn reset(&mut self) {
        self.phase.clear();
        self.last_value = None;
        self.phase_count = 0;
    }
}
