/// Raw-data estimator
///
/// Returns every value unchanged, so plotting the raw series is toggled the
/// same way as the derived ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Passthrough {
    pub fn update(&mut self, value: f64) -> f64 {
        value
    }
}
